//! wsbridge runtime.
//!
//! Drives WebSocket connections on tokio: client construction, the listener,
//! the per-connection state machine and the handles applications hold.

pub mod api;
pub mod client;
pub mod config;
pub mod connection;
pub mod handlers;
pub mod server;
pub mod transport;

pub use api::{create_client, create_client_url, create_server, release_client, release_server, send};
pub use connection::{ConnState, ConnectionHandle, ConnectionId, WriteReceipt};
pub use handlers::HandlerSet;
pub use server::{Listener, ListenerState};
pub use wsbridge_core::protocol::message::{Message, MessageKind};
