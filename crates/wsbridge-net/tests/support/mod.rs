//! Shared helpers for the runtime integration tests.
#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use wsbridge_core::protocol::frame::{decode, Decoded, Frame};
use wsbridge_core::protocol::handshake::{
    compute_accept_key, HeaderBlock, HeaderBuffer, HttpRequest, ServerHandshake,
};
use wsbridge_core::Role;
use wsbridge_net::transport::Transport;
use wsbridge_net::{ConnState, HandlerSet};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(ConnState),
    Ready(ConnState),
    Receive(Vec<u8>),
    Close(ConnState),
}

pub type Events = mpsc::UnboundedReceiver<Event>;

/// Handlers that report every callback, with the state seen at that moment.
pub fn recording_handlers() -> (HandlerSet<mpsc::UnboundedSender<Event>>, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handlers = HandlerSet::new(tx)
        .on_connect(|conn, tx| {
            let _ = tx.send(Event::Connect(conn.state()));
        })
        .on_ready(|conn, tx| {
            let _ = tx.send(Event::Ready(conn.state()));
        })
        .on_receive(|_, payload, tx| {
            let _ = tx.send(Event::Receive(payload.to_vec()));
        })
        .on_close(|conn, tx| {
            let _ = tx.send(Event::Close(conn.state()));
        });
    (handlers, rx)
}

/// Like [`recording_handlers`], and every received message is sent back
/// with its kind.
pub fn echo_handlers() -> (HandlerSet<mpsc::UnboundedSender<Event>>, Events) {
    let (handlers, rx) = recording_handlers();
    let handlers = handlers.on_message(|conn, msg, _| {
        let _ = conn.send_message(msg);
    });
    (handlers, rx)
}

pub async fn next_event(events: &mut Events) -> Event {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a callback")
        .expect("event channel closed")
}

/// Hands out one pre-made in-memory stream, then refuses.
pub struct DuplexTransport(Mutex<Option<DuplexStream>>);

impl DuplexTransport {
    pub fn pair() -> (Arc<Self>, DuplexStream) {
        let (ours, theirs) = duplex(64 * 1024);
        (Arc::new(Self(Mutex::new(Some(ours)))), theirs)
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self(Mutex::new(None)))
    }
}

#[async_trait]
impl Transport for DuplexTransport {
    type Stream = DuplexStream;

    async fn connect(&self, _host: &str, _port: u16) -> io::Result<DuplexStream> {
        let stream = self.0.lock().unwrap().take();
        stream.ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
    }
}

/// The far end of a connection under test, scripted byte by byte.
pub struct Peer {
    pub io: DuplexStream,
    buf: BytesMut,
    role: Role,
}

impl Peer {
    /// Peer playing the server against a client-role connection.
    pub fn server(io: DuplexStream) -> Self {
        Self {
            io,
            buf: BytesMut::new(),
            role: Role::Server,
        }
    }

    /// Peer playing the client against a server-role connection.
    pub fn client(io: DuplexStream) -> Self {
        Self {
            io,
            buf: BytesMut::new(),
            role: Role::Client,
        }
    }

    pub async fn write(&mut self, bytes: &[u8]) {
        self.io.write_all(bytes).await.unwrap();
        self.io.flush().await.unwrap();
    }

    pub async fn read_head(&mut self) -> HeaderBlock {
        let mut headers = HeaderBuffer::new(8192);
        let mut chunk = [0u8; 512];
        loop {
            let n = timeout(WAIT, self.io.read(&mut chunk))
                .await
                .expect("timed out reading header")
                .unwrap();
            assert!(n > 0, "stream ended before the header block");
            if let Some(block) = headers.push(&chunk[..n]).unwrap() {
                self.buf.extend_from_slice(&block.rest);
                return block;
            }
        }
    }

    /// Read the client's request and answer with a valid 101.
    pub async fn accept_upgrade(&mut self) -> HttpRequest {
        let block = self.read_head().await;
        let req = HttpRequest::parse(&block.head).unwrap();
        let key = req.header("Sec-WebSocket-Key").unwrap();
        let response = ServerHandshake::response_bytes(&compute_accept_key(key));
        self.write(&response).await;
        req
    }

    pub async fn read_frame(&mut self) -> Frame {
        loop {
            if let Decoded::Frame { frame, consumed } =
                decode(&self.buf[..], self.role, 1 << 20).unwrap()
            {
                self.buf.advance(consumed);
                return frame;
            }
            let n = timeout(WAIT, self.io.read_buf(&mut self.buf))
                .await
                .expect("timed out reading frame")
                .unwrap();
            assert!(n > 0, "stream ended before a full frame");
        }
    }

    /// Wait for the connection to drop its end.
    pub async fn expect_eof(&mut self) {
        let mut sink = Vec::new();
        timeout(WAIT, self.io.read_to_end(&mut sink))
            .await
            .expect("timed out waiting for eof")
            .unwrap();
    }
}
