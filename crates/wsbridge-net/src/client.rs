//! Client-role construction.

use std::sync::Arc;

use tokio::runtime::Handle;

use wsbridge_core::error::{Result, WsError};
use wsbridge_core::protocol::handshake::WsUrl;
use wsbridge_core::Role;

use crate::config::{BridgeConfig, ConnectionConfig};
use crate::connection::{ConnectionHandle, ConnectionTask};
use crate::handlers::HandlerSet;
use crate::transport::{TcpTransport, Transport};

/// Start a client connection to `ws://host:port/path` over TCP.
///
/// Returns as soon as the connection task is spawned, in state `connecting`.
/// Connect, handshake and open all happen on that task; failures arrive
/// through `on_close`.
pub fn connect<C: Send + Sync + 'static>(
    host: &str,
    port: u16,
    path: &str,
    handlers: HandlerSet<C>,
    cfg: &BridgeConfig,
) -> Result<ConnectionHandle> {
    let transport = Arc::new(TcpTransport::new(&cfg.tcp));
    connect_with(transport, host, port, path, handlers, cfg.connection())
}

/// Like [`connect`], taking a `ws://` URL.
pub fn connect_url<C: Send + Sync + 'static>(
    url: &str,
    handlers: HandlerSet<C>,
    cfg: &BridgeConfig,
) -> Result<ConnectionHandle> {
    let url = WsUrl::parse(url)?;
    connect(&url.host, url.port, &url.path, handlers, cfg)
}

/// Start a client connection over a custom transport. Requires a tokio runtime.
pub fn connect_with<T: Transport, C: Send + Sync + 'static>(
    transport: Arc<T>,
    host: &str,
    port: u16,
    path: &str,
    handlers: HandlerSet<C>,
    cfg: ConnectionConfig,
) -> Result<ConnectionHandle> {
    if !path.starts_with('/') {
        return Err(WsError::Config(format!("request path must start with '/': {path}")));
    }
    let rt = Handle::try_current()
        .map_err(|_| WsError::Transport("no tokio runtime available".into()))?;

    let (task, conn) = ConnectionTask::new(Role::Client, None, handlers, cfg);
    rt.spawn(task.run_client(transport, host.to_owned(), port, path.to_owned()));
    Ok(conn)
}
