//! Transport provider seam.
//!
//! The runtime only needs an ordered, reliable byte stream. `Transport`
//! produces one for the client role and `Accept` yields them for the
//! listener. Tests plug in in-memory streams through the same traits.

mod tcp;

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

pub(crate) use tcp::TcpAcceptor;
pub use tcp::TcpTransport;

/// Outbound connector.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// Inbound stream source for the listener.
#[async_trait]
pub(crate) trait Accept: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}
