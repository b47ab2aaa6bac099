//! Application callbacks for one endpoint.
//!
//! A `HandlerSet` pairs the four lifecycle callbacks with a typed owner
//! context. Every callback receives the connection handle and a reference to
//! that context; the runtime never touches the context itself. Callbacks for
//! one connection run on that connection's task, one at a time. The context
//! is shared by all connections created from the same set, so interior state
//! needs its own synchronization.
//!
//! A panicking callback does not take the connection task down with it: the
//! panic is caught and logged, and the connection is asked to close.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use wsbridge_core::protocol::message::Message;

use crate::connection::ConnectionHandle;

type ConnFn<C> = Arc<dyn Fn(&ConnectionHandle, &C) + Send + Sync>;
type RecvFn<C> = Arc<dyn Fn(&ConnectionHandle, &[u8], &C) + Send + Sync>;
type MessageFn<C> = Arc<dyn Fn(&ConnectionHandle, &Message, &C) + Send + Sync>;

pub struct HandlerSet<C> {
    owner: Arc<C>,
    on_connect: Option<ConnFn<C>>,
    on_ready: Option<ConnFn<C>>,
    on_receive: Option<RecvFn<C>>,
    on_message: Option<MessageFn<C>>,
    on_close: Option<ConnFn<C>>,
}

impl<C> Clone for HandlerSet<C> {
    fn clone(&self) -> Self {
        Self {
            owner: Arc::clone(&self.owner),
            on_connect: self.on_connect.clone(),
            on_ready: self.on_ready.clone(),
            on_receive: self.on_receive.clone(),
            on_message: self.on_message.clone(),
            on_close: self.on_close.clone(),
        }
    }
}

impl<C> fmt::Debug for HandlerSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_ready", &self.on_ready.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

impl<C: Send + Sync + 'static> HandlerSet<C> {
    pub fn new(owner: C) -> Self {
        Self::with_owner(Arc::new(owner))
    }

    /// Share an owner context the caller keeps a reference to.
    pub fn with_owner(owner: Arc<C>) -> Self {
        Self {
            owner,
            on_connect: None,
            on_ready: None,
            on_receive: None,
            on_message: None,
            on_close: None,
        }
    }

    pub fn owner(&self) -> &Arc<C> {
        &self.owner
    }

    /// Server role: a transport connection was accepted, before the handshake.
    pub fn on_connect(mut self, f: impl Fn(&ConnectionHandle, &C) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Server role: the handshake completed and the connection is open.
    pub fn on_ready(mut self, f: impl Fn(&ConnectionHandle, &C) + Send + Sync + 'static) -> Self {
        self.on_ready = Some(Arc::new(f));
        self
    }

    /// A complete message arrived.
    pub fn on_receive(
        mut self,
        f: impl Fn(&ConnectionHandle, &[u8], &C) + Send + Sync + 'static,
    ) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// A complete message arrived, with its kind. Fires after `on_receive`
    /// when both are registered.
    pub fn on_message(
        mut self,
        f: impl Fn(&ConnectionHandle, &Message, &C) + Send + Sync + 'static,
    ) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    /// The connection reached `closed`. Fires exactly once per connection.
    pub fn on_close(mut self, f: impl Fn(&ConnectionHandle, &C) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }
}

impl<C> HandlerSet<C> {
    pub(crate) fn call_connect(&self, conn: &ConnectionHandle) {
        if let Some(f) = &self.on_connect {
            guarded("on_connect", conn, || f(conn, &self.owner));
        }
    }

    pub(crate) fn call_ready(&self, conn: &ConnectionHandle) {
        if let Some(f) = &self.on_ready {
            guarded("on_ready", conn, || f(conn, &self.owner));
        }
    }

    pub(crate) fn call_receive(&self, conn: &ConnectionHandle, msg: &Message) {
        if let Some(f) = &self.on_receive {
            guarded("on_receive", conn, || f(conn, &msg.payload, &self.owner));
        }
        if let Some(f) = &self.on_message {
            guarded("on_message", conn, || f(conn, msg, &self.owner));
        }
    }

    pub(crate) fn call_close(&self, conn: &ConnectionHandle) {
        if let Some(f) = &self.on_close {
            guarded("on_close", conn, || f(conn, &self.owner));
        }
    }
}

fn guarded(callback: &'static str, conn: &ConnectionHandle, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(conn_id = %conn.id(), callback, "callback panicked, closing connection");
        conn.close();
    }
}
