//! Top-level facade crate for wsbridge.
//!
//! Re-exports the protocol core and the tokio runtime so users can depend on a single crate.

pub mod core {
    pub use wsbridge_core::*;
}

pub mod net {
    pub use wsbridge_net::*;
}

pub use wsbridge_core::{ErrorKind, Result, WsError};
pub use wsbridge_net::{
    create_client, create_client_url, create_server, release_client, release_server, send,
    ConnState, ConnectionHandle, HandlerSet, Listener,
};
