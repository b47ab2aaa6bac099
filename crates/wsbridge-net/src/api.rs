//! Construction API.
//!
//! Thin entry points over [`client`](crate::client) and
//! [`Listener`](crate::server::Listener) using default configuration.

use std::net::{Ipv4Addr, SocketAddr};

use bytes::Bytes;

use wsbridge_core::error::Result;

use crate::client;
use crate::config::BridgeConfig;
use crate::connection::{ConnectionHandle, WriteReceipt};
use crate::handlers::HandlerSet;
use crate::server::Listener;

/// Connect to `ws://host:port/path`. The returned handle starts in
/// `connecting`; progress and failure arrive through the handlers.
pub fn create_client<C: Send + Sync + 'static>(
    host: &str,
    port: u16,
    path: &str,
    handlers: HandlerSet<C>,
) -> Result<ConnectionHandle> {
    client::connect(host, port, path, handlers, &BridgeConfig::default())
}

pub fn create_client_url<C: Send + Sync + 'static>(
    url: &str,
    handlers: HandlerSet<C>,
) -> Result<ConnectionHandle> {
    client::connect_url(url, handlers, &BridgeConfig::default())
}

/// Listen on every IPv4 interface at `port` (0 picks a free port).
pub async fn create_server<C: Send + Sync + 'static>(
    port: u16,
    path: &str,
    handlers: HandlerSet<C>,
) -> Result<Listener> {
    let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    Listener::start(bind, path, handlers, &BridgeConfig::default()).await
}

/// Queue `data` as one binary message.
pub fn send(conn: &ConnectionHandle, data: impl Into<Bytes>) -> Result<WriteReceipt> {
    conn.send(data)
}

/// Drop the caller's handle after requesting closure. The connection task
/// finishes the close handshake and fires `on_close`.
pub fn release_client(conn: ConnectionHandle) {
    conn.close();
}

/// Stop accepting. Spawned connections drain unless `close_on_stop` is set.
pub fn release_server(listener: Listener) {
    listener.stop();
}
