use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Notify};

use wsbridge_core::error::{Result, WsError};
use wsbridge_core::protocol::frame::Frame;
use wsbridge_core::protocol::message::Message;
use wsbridge_core::Role;

use super::state::{ConnState, StateCell};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work queued for the driver.
pub(crate) enum Command {
    Send {
        frame: Frame,
        done: oneshot::Sender<Result<()>>,
    },
}

pub(crate) struct Shared {
    pub(crate) id: ConnectionId,
    pub(crate) role: Role,
    pub(crate) state: StateCell,
    pub(crate) peer: Option<SocketAddr>,
    cmd_tx: mpsc::Sender<Command>,
    cancel: Notify,
    cancelled: AtomicBool,
}

impl Shared {
    /// Resolves once `close()` has been requested.
    pub(crate) async fn cancelled(&self) {
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            self.cancel.notified().await;
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Non-owning reference to a connection. Cheap to clone; the driver task
/// owns all connection resources.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub(crate) shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        role: Role,
        peer: Option<SocketAddr>,
        initial: ConnState,
        send_queue: usize,
    ) -> (Self, mpsc::Receiver<Command>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(send_queue.max(1));
        let shared = Shared {
            id: ConnectionId::next(),
            role,
            state: StateCell::new(initial),
            peer,
            cmd_tx,
            cancel: Notify::new(),
            cancelled: AtomicBool::new(false),
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            cmd_rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn state(&self) -> ConnState {
        self.shared.state.load()
    }

    /// Remote address for accepted connections.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer
    }

    /// Queue a binary message. Returns immediately; the receipt resolves once
    /// the frame is written. Writes go out in submission order.
    ///
    /// Refused with `QueueFull` while `limits.send_queue` sends are pending;
    /// a refused send is never written.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<WriteReceipt> {
        self.send_frame(Frame::binary(data))
    }

    /// Queue a text message.
    pub fn send_text(&self, text: impl Into<String>) -> Result<WriteReceipt> {
        self.send_frame(Frame::text(Bytes::from(text.into())))
    }

    /// Queue a message with its own kind, so text stays text.
    pub fn send_message(&self, msg: &Message) -> Result<WriteReceipt> {
        self.send_frame(Frame::new(msg.opcode(), msg.payload.clone()))
    }

    fn send_frame(&self, frame: Frame) -> Result<WriteReceipt> {
        if !self.state().accepts_sends() || self.shared.is_cancelled() {
            return Err(WsError::Closed);
        }
        let (done, rx) = oneshot::channel();
        match self.shared.cmd_tx.try_send(Command::Send { frame, done }) {
            Ok(()) => Ok(WriteReceipt { rx }),
            Err(TrySendError::Full(_)) => Err(WsError::QueueFull {
                capacity: self.shared.cmd_tx.max_capacity(),
            }),
            Err(TrySendError::Closed(_)) => Err(WsError::Closed),
        }
    }

    /// Request closure. Never blocks and never runs a callback on the
    /// caller's stack; `on_close` fires later on the connection's task.
    /// Calling it more than once is harmless.
    pub fn close(&self) {
        if !self.shared.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!(conn_id = %self.id(), "close requested");
        }
        self.shared.cancel.notify_one();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id())
            .field("role", &self.role())
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ConnectionHandle {}

/// Completion of one queued write.
#[derive(Debug)]
#[must_use = "a receipt does nothing unless awaited; drop it to fire and forget"]
pub struct WriteReceipt {
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for WriteReceipt {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            // Driver went away without reporting: the connection closed first.
            Poll::Ready(Err(_)) => Poll::Ready(Err(WsError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
