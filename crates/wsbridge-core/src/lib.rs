//! wsbridge core: transport-agnostic WebSocket primitives and error types.
//!
//! This crate holds the RFC 6455 wire contracts shared by the runtime:
//! frame codec, fragment assembly, close payloads and the HTTP Upgrade
//! handshake. It carries no runtime or socket dependencies; every function
//! works on byte buffers so callers decide how bytes move.
//!
//! # Defensive guarantees
//! Panics, `unwrap` and `expect` are compile-denied here. Malformed input
//! from a peer is always reported as a [`ProtocolError`] or
//! [`HandshakeError`], never a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorKind, HandshakeError, ProtocolError, Result, WsError};
pub use protocol::Role;
