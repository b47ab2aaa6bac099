use std::time::Duration;

use serde::Deserialize;
use wsbridge_core::error::{Result, WsError};
use wsbridge_core::protocol::frame::MAX_CONTROL_PAYLOAD;
use wsbridge_core::protocol::handshake::DEFAULT_MAX_HEADER_BYTES;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub version: u32,

    #[serde(default)]
    pub limits: LimitsSection,

    #[serde(default)]
    pub timeouts: TimeoutsSection,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub tcp: TcpSection,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            limits: LimitsSection::default(),
            timeouts: TimeoutsSection::default(),
            server: ServerSection::default(),
            tcp: TcpSection::default(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(WsError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.limits.validate()?;
        self.timeouts.validate()?;
        self.server.validate()?;
        Ok(())
    }

    /// Per-connection settings derived from the limits and timeouts.
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_header_bytes: self.limits.max_header_bytes,
            max_frame_bytes: self.limits.max_frame_bytes,
            max_message_bytes: self.limits.max_message_bytes,
            send_queue: self.limits.send_queue,
            connect_timeout: Duration::from_millis(self.timeouts.connect_ms),
            handshake_timeout: Duration::from_millis(self.timeouts.handshake_ms),
            close_timeout: Duration::from_millis(self.timeouts.close_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,

    #[serde(default = "default_max_payload_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_max_payload_bytes")]
    pub max_message_bytes: usize,

    /// Sends a connection may hold queued before `send` refuses with `QueueFull`.
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_header_bytes: default_max_header_bytes(),
            max_frame_bytes: default_max_payload_bytes(),
            max_message_bytes: default_max_payload_bytes(),
            send_queue: default_send_queue(),
        }
    }
}

impl LimitsSection {
    pub fn validate(&self) -> Result<()> {
        if !(512..=65536).contains(&self.max_header_bytes) {
            return Err(WsError::Config(
                "limits.max_header_bytes must be between 512 and 65536".into(),
            ));
        }
        if self.max_message_bytes < MAX_CONTROL_PAYLOAD {
            return Err(WsError::Config(format!(
                "limits.max_message_bytes must be at least {MAX_CONTROL_PAYLOAD}"
            )));
        }
        if !(1..=65536).contains(&self.send_queue) {
            return Err(WsError::Config(
                "limits.send_queue must be between 1 and 65536".into(),
            ));
        }
        if self.max_frame_bytes < MAX_CONTROL_PAYLOAD
            || self.max_frame_bytes > self.max_message_bytes
        {
            return Err(WsError::Config(format!(
                "limits.max_frame_bytes must be between {MAX_CONTROL_PAYLOAD} and max_message_bytes"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsSection {
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,

    #[serde(default = "default_handshake_ms")]
    pub handshake_ms: u64,

    #[serde(default = "default_close_ms")]
    pub close_ms: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            handshake_ms: default_handshake_ms(),
            close_ms: default_close_ms(),
        }
    }
}

impl TimeoutsSection {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("connect_ms", self.connect_ms),
            ("handshake_ms", self.handshake_ms),
            ("close_ms", self.close_ms),
        ] {
            if !(100..=120000).contains(&v) {
                return Err(WsError::Config(format!(
                    "timeouts.{name} must be between 100 and 120000"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_path")]
    pub path: String,

    /// Close spawned connections when the listener stops (default: let them drain).
    #[serde(default)]
    pub close_on_stop: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            close_on_stop: false,
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(WsError::Config("server.path must start with '/'".into()));
        }
        if self.listen.is_empty() {
            return Err(WsError::Config("server.listen must not be empty".into()));
        }
        Ok(())
    }
}

/// Socket options for both outbound connections and accepted streams.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpSection {
    #[serde(default = "default_true")]
    pub nodelay: bool,

    #[serde(default = "default_true")]
    pub keepalive: bool,
}

impl Default for TcpSection {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: true,
        }
    }
}

/// Settings one connection runs with.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub max_header_bytes: usize,
    pub max_frame_bytes: usize,
    pub max_message_bytes: usize,
    pub send_queue: usize,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        BridgeConfig::default().connection()
    }
}

fn default_max_header_bytes() -> usize {
    DEFAULT_MAX_HEADER_BYTES
}
fn default_max_payload_bytes() -> usize {
    16 * 1024 * 1024
}
fn default_send_queue() -> usize {
    1024
}
fn default_connect_ms() -> u64 {
    10000
}
fn default_handshake_ms() -> u64 {
    10000
}
fn default_close_ms() -> u64 {
    5000
}
fn default_listen() -> String {
    "0.0.0.0:9001".into()
}
fn default_path() -> String {
    "/ws".into()
}
fn default_true() -> bool {
    true
}
