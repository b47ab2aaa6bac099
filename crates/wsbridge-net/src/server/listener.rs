use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::Instrument;

use wsbridge_core::error::{Result, WsError};
use wsbridge_core::protocol::handshake::ServerHandshake;
use wsbridge_core::Role;

use super::registry::ConnectionRegistry;
use crate::config::{BridgeConfig, ConnectionConfig};
use crate::connection::{ConnectionHandle, ConnectionTask};
use crate::handlers::HandlerSet;
use crate::transport::{Accept, TcpAcceptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Starting = 0,
    Ready,
    Cancelled,
    Failed,
}

impl ListenerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ListenerState::Starting => "starting",
            ListenerState::Ready => "ready",
            ListenerState::Cancelled => "cancelled",
            ListenerState::Failed => "failed",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => ListenerState::Starting,
            1 => ListenerState::Ready,
            2 => ListenerState::Cancelled,
            _ => ListenerState::Failed,
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ListenerShared {
    state: AtomicU8,
    stopped: AtomicBool,
    cancel: Notify,
    registry: Arc<ConnectionRegistry>,
    close_on_stop: bool,
}

impl ListenerShared {
    fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `cancelled` and `failed` are terminal.
    fn leave_ready(&self, next: ListenerState) -> bool {
        self.state
            .compare_exchange(
                ListenerState::Ready as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    async fn stopped(&self) {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            self.cancel.notified().await;
        }
    }
}

/// Accepts transport connections and runs one server-role connection per
/// accepted stream. Dropping the listener stops it.
pub struct Listener {
    local_addr: SocketAddr,
    path: String,
    shared: Arc<ListenerShared>,
}

impl Listener {
    /// Bind `bind` and start accepting upgrades for `path`.
    ///
    /// Resolves once the socket is bound; the returned listener is `ready`.
    /// A bind failure is returned as a transport error.
    pub async fn start<C: Send + Sync + 'static>(
        bind: SocketAddr,
        path: impl Into<String>,
        handlers: HandlerSet<C>,
        cfg: &BridgeConfig,
    ) -> Result<Listener> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(WsError::Config(format!("listener path must start with '/': {path}")));
        }

        let acceptor = TcpAcceptor::bind(bind, &cfg.tcp)
            .map_err(|e| WsError::Transport(format!("bind {bind} failed: {e}")))?;
        let local_addr = acceptor.local_addr()?;
        Ok(Self::spawn(acceptor, local_addr, path, handlers, cfg))
    }

    /// Mark the listener `ready` and run the accept loop over `acceptor`.
    fn spawn<A: Accept, C: Send + Sync + 'static>(
        acceptor: A,
        local_addr: SocketAddr,
        path: String,
        handlers: HandlerSet<C>,
        cfg: &BridgeConfig,
    ) -> Listener {
        let shared = Arc::new(ListenerShared {
            state: AtomicU8::new(ListenerState::Ready as u8),
            stopped: AtomicBool::new(false),
            cancel: Notify::new(),
            registry: Arc::new(ConnectionRegistry::new()),
            close_on_stop: cfg.server.close_on_stop,
        });
        tracing::info!(%local_addr, %path, "listener ready");

        let span = tracing::info_span!("listener", addr = %local_addr);
        tokio::spawn(
            accept_loop(
                acceptor,
                Arc::clone(&shared),
                ServerHandshake::new(path.clone()),
                handlers,
                cfg.connection(),
            )
            .instrument(span),
        );

        Listener {
            local_addr,
            path,
            shared,
        }
    }

    /// Start from the `server` section of `cfg`.
    pub async fn from_config<C: Send + Sync + 'static>(
        cfg: &BridgeConfig,
        handlers: HandlerSet<C>,
    ) -> Result<Listener> {
        let bind: SocketAddr = cfg.server.listen.parse().map_err(|_| {
            WsError::Config(format!(
                "server.listen must be a socket address: {}",
                cfg.server.listen
            ))
        })?;
        Self::start(bind, cfg.server.path.clone(), handlers, cfg).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> ListenerState {
        self.shared.state()
    }

    /// Snapshot of connections spawned by this listener that have not closed yet.
    pub fn connections(&self) -> Vec<ConnectionHandle> {
        self.shared.registry.snapshot()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Cancel outstanding accepts. Spawned connections keep running unless
    /// the listener was configured with `close_on_stop`. Idempotent.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.cancel.notify_one();
        if self.shared.leave_ready(ListenerState::Cancelled) {
            tracing::info!(local_addr = %self.local_addr, "listener stopped");
        }
        if self.shared.close_on_stop {
            let n = self.shared.registry.close_all();
            tracing::debug!(connections = n, "closing spawned connections");
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

async fn accept_loop<A: Accept, C: Send + Sync + 'static>(
    mut acceptor: A,
    shared: Arc<ListenerShared>,
    handshake: ServerHandshake,
    handlers: HandlerSet<C>,
    cfg: ConnectionConfig,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shared.stopped() => break,
            res = acceptor.accept() => res,
        };

        let (stream, peer) = match accepted {
            Ok(v) => v,
            Err(e) => {
                if shared.leave_ready(ListenerState::Failed) {
                    tracing::error!(error = %e, "accept failed, listener stopped");
                }
                break;
            }
        };

        let (task, conn) = ConnectionTask::new(Role::Server, Some(peer), handlers.clone(), cfg.clone());
        tracing::debug!(conn_id = %conn.id(), %peer, "accepted");

        let registry = Arc::clone(&shared.registry);
        let task = task.on_finish(move |conn| {
            registry.remove(conn.id());
        });
        shared.registry.insert(conn.clone());
        if shared.close_on_stop && shared.stopped.load(Ordering::Acquire) {
            conn.close();
        }

        tokio::spawn(task.run_server(stream, handshake.clone()));
    }
    tracing::debug!("accept loop exited");
}
