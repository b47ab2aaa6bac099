//! Listener / dispatcher.

mod listener;
mod registry;

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;

use wsbridge_core::error::{Result, WsError};
use wsbridge_core::protocol::handshake::ServerHandshake;
use wsbridge_core::Role;

use crate::config::ConnectionConfig;
use crate::connection::{ConnectionHandle, ConnectionTask};
use crate::handlers::HandlerSet;

pub use listener::{Listener, ListenerState};

/// Run a server-role connection over an already accepted stream.
///
/// `on_connect` fires on the spawned task before the handshake is read.
/// Requires a tokio runtime.
pub fn serve_stream<S, C>(
    stream: S,
    peer: Option<SocketAddr>,
    path: impl Into<String>,
    handlers: HandlerSet<C>,
    cfg: ConnectionConfig,
) -> Result<ConnectionHandle>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    C: Send + Sync + 'static,
{
    let rt = Handle::try_current()
        .map_err(|_| WsError::Transport("no tokio runtime available".into()))?;
    let (task, conn) = ConnectionTask::new(Role::Server, peer, handlers, cfg);
    rt.spawn(task.run_server(stream, ServerHandshake::new(path)));
    Ok(conn)
}
