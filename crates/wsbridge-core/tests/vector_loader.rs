//! JSON test vector loader shared by frame tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use wsbridge_core::Role;

#[derive(Debug, Deserialize)]
pub struct TestVector {
    pub description: String,
    pub role: String,
    pub frame: FrameData,
    #[serde(default)]
    pub expect: Option<serde_json::Value>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
    #[serde(default)]
    pub need_more: bool,
}

impl TestVector {
    /// Role of the endpoint decoding the frame.
    pub fn role(&self) -> Role {
        match self.role.as_str() {
            "client" => Role::Client,
            "server" => Role::Server,
            other => panic!("unsupported role: {other}"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct FrameData {
    pub encoding: String,
    pub data: String,
}

impl FrameData {
    pub fn decode(&self) -> Vec<u8> {
        match self.encoding.as_str() {
            "base64" => STANDARD.decode(&self.data).expect("invalid base64 in test vector"),
            "hex" => hex::decode(&self.data).expect("invalid hex in test vector"),
            other => panic!("unsupported encoding: {other}"),
        }
    }
}
