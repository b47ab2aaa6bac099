//! The per-connection task.
//!
//! One task per connection runs the whole lifecycle: transport connect
//! (client), Upgrade handshake, the open receive loop and the close
//! handshake. The receive loop is a plain `loop` over `tokio::select!` that
//! polls reads, the [`Writer`] future and closure requests together, so a
//! slow reader on the other side never stops us from draining our own input.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::Instrument;

use wsbridge_core::error::{Result, WsError};
use wsbridge_core::protocol::close::{CloseCode, CloseFrame};
use wsbridge_core::protocol::frame::{decode, Decoded, Frame, Opcode};
use wsbridge_core::protocol::handshake::{
    ClientHandshake, HeaderBlock, HeaderBuffer, HttpRequest, HttpResponse, ServerHandshake,
};
use wsbridge_core::protocol::message::MessageAssembler;
use wsbridge_core::Role;

use super::handle::{Command, ConnectionHandle};
use super::state::ConnState;
use super::writer::{Outbound, Writer};
use crate::config::ConnectionConfig;
use crate::handlers::HandlerSet;
use crate::transport::Transport;

const READ_CHUNK: usize = 8 * 1024;

type FinishHook = Box<dyn FnOnce(&ConnectionHandle) + Send + Sync>;
type Control = mpsc::UnboundedSender<Outbound>;

/// How the open phase ended without an error.
enum Exit {
    PeerClosed(CloseFrame),
    LocalClose,
}

pub(crate) struct ConnectionTask<C> {
    handle: ConnectionHandle,
    handlers: HandlerSet<C>,
    cfg: ConnectionConfig,
    /// Moves into the writer once the connection opens.
    cmd_rx: Option<mpsc::Receiver<Command>>,
    on_finish: Option<FinishHook>,
    finished: bool,
}

impl<C: Send + Sync + 'static> ConnectionTask<C> {
    pub(crate) fn new(
        role: Role,
        peer: Option<std::net::SocketAddr>,
        handlers: HandlerSet<C>,
        cfg: ConnectionConfig,
    ) -> (Self, ConnectionHandle) {
        let (handle, cmd_rx) =
            ConnectionHandle::new(role, peer, ConnState::Connecting, cfg.send_queue);
        let task = Self {
            handle: handle.clone(),
            handlers,
            cfg,
            cmd_rx: Some(cmd_rx),
            on_finish: None,
            finished: false,
        };
        (task, handle)
    }

    /// Run `hook` after the connection reaches `closed`, before `on_close`.
    pub(crate) fn on_finish(
        mut self,
        hook: impl FnOnce(&ConnectionHandle) + Send + Sync + 'static,
    ) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }

    fn span(&self) -> tracing::Span {
        tracing::debug_span!(
            "conn",
            conn_id = %self.handle.id(),
            role = self.handle.role().as_str()
        )
    }

    pub(crate) async fn run_client<T: Transport>(
        mut self,
        transport: Arc<T>,
        host: String,
        port: u16,
        path: String,
    ) {
        let span = self.span();
        async move {
            let result = self.client_phase(&*transport, &host, port, &path).await;
            self.finish(result);
        }
        .instrument(span)
        .await
    }

    pub(crate) async fn run_server<S>(mut self, stream: S, hs: ServerHandshake)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let span = self.span();
        async move {
            self.handlers.call_connect(&self.handle);
            let result = self.server_phase(stream, &hs).await;
            self.finish(result);
        }
        .instrument(span)
        .await
    }

    async fn client_phase<T: Transport>(
        &mut self,
        transport: &T,
        host: &str,
        port: u16,
        path: &str,
    ) -> Result<()> {
        let shared = Arc::clone(&self.handle.shared);

        let connect = timeout(self.cfg.connect_timeout, transport.connect(host, port));
        let mut stream = tokio::select! {
            res = connect => res
                .map_err(|_| WsError::Transport(format!("connect to {host}:{port} timed out")))??,
            _ = shared.cancelled() => return Ok(()),
        };
        self.advance(ConnState::Handshaking);

        let hs = ClientHandshake::new(host, port, path);
        let handshake = timeout(
            self.cfg.handshake_timeout,
            client_handshake(&mut stream, &hs, self.cfg.max_header_bytes),
        );
        let rest = tokio::select! {
            res = handshake => res.map_err(|_| handshake_timed_out())??,
            _ = shared.cancelled() => return Ok(()),
        };
        self.advance(ConnState::Open);

        self.open_phase(stream, rest).await
    }

    async fn server_phase<S>(&mut self, mut stream: S, hs: &ServerHandshake) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let shared = Arc::clone(&self.handle.shared);
        self.advance(ConnState::Handshaking);

        let handshake = timeout(
            self.cfg.handshake_timeout,
            server_handshake(&mut stream, hs, self.cfg.max_header_bytes),
        );
        let rest = tokio::select! {
            res = handshake => res.map_err(|_| handshake_timed_out())??,
            _ = shared.cancelled() => return Ok(()),
        };
        self.advance(ConnState::Open);
        self.handlers.call_ready(&self.handle);

        self.open_phase(stream, rest).await
    }

    async fn open_phase<S>(&mut self, stream: S, rest: Bytes) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let shared = Arc::clone(&self.handle.shared);
        let cmds = self.cmd_rx.take().ok_or(WsError::Closed)?;
        let (mut rd, wr) = tokio::io::split(stream);
        let (ctl, ctl_rx) = mpsc::unbounded_channel();
        let writer = Writer::new(wr, self.handle.role(), cmds, ctl_rx).run();
        tokio::pin!(writer);

        let mut buf = BytesMut::from(&rest[..]);
        let mut asm = MessageAssembler::new(self.cfg.max_message_bytes);

        let exit = loop {
            match self.drain_frames(&mut buf, &mut asm, &ctl) {
                Ok(Some(close)) => break Exit::PeerClosed(close),
                Ok(None) => {}
                Err(e) => return Err(self.fail(&ctl, writer.as_mut(), e).await),
            }

            buf.reserve(READ_CHUNK);
            tokio::select! {
                read = rd.read_buf(&mut buf) => {
                    if read? == 0 {
                        return Err(WsError::Transport(
                            "peer closed the stream without a close frame".into(),
                        ));
                    }
                }
                // The writer only returns early when a write fails.
                res = &mut writer => {
                    res?;
                    return Err(WsError::Transport("writer stopped unexpectedly".into()));
                }
                _ = shared.cancelled() => break Exit::LocalClose,
            }
        };

        match exit {
            Exit::PeerClosed(close) => self.acknowledge_close(&ctl, writer.as_mut(), close).await,
            Exit::LocalClose => {
                self.close_locally(&mut rd, &ctl, writer.as_mut(), buf, asm)
                    .await
            }
        }
    }

    /// Decode every complete frame held in `buf`. Returns the peer's close
    /// frame if one arrived; bytes after it are ignored.
    fn drain_frames(
        &mut self,
        buf: &mut BytesMut,
        asm: &mut MessageAssembler,
        ctl: &Control,
    ) -> Result<Option<CloseFrame>> {
        let role = self.handle.role();
        loop {
            let (frame, consumed) = match decode(&buf[..], role, self.cfg.max_frame_bytes)? {
                Decoded::NeedMoreData => return Ok(None),
                Decoded::Frame { frame, consumed } => (frame, consumed),
            };
            buf.advance(consumed);

            match frame.opcode {
                Opcode::Ping => {
                    let _ = ctl.send(Outbound::Control(Frame::pong(frame.payload)));
                }
                Opcode::Pong => {}
                Opcode::Close => return Ok(Some(CloseFrame::parse(&frame.payload)?)),
                Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                    if let Some(msg) = asm.push(frame)? {
                        tracing::trace!(len = msg.payload.len(), kind = ?msg.kind, "message received");
                        self.handlers.call_receive(&self.handle, &msg);
                    }
                }
            }
        }
    }

    /// Flush queued sends, echo the peer's close and wait for the writer.
    async fn acknowledge_close<F>(
        &mut self,
        ctl: &Control,
        writer: Pin<&mut F>,
        close: CloseFrame,
    ) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        tracing::debug!(code = ?close.code, reason = %close.reason, "peer initiated close");
        self.advance(ConnState::Closing);
        let _ = ctl.send(Outbound::Close {
            frame: Frame::close(&close.echo()),
            drain: true,
        });
        timeout(self.cfg.close_timeout, writer)
            .await
            .map_err(|_| WsError::Transport("close acknowledgement timed out".into()))?
    }

    async fn close_locally<R, F>(
        &mut self,
        rd: &mut R,
        ctl: &Control,
        mut writer: Pin<&mut F>,
        mut buf: BytesMut,
        mut asm: MessageAssembler,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        F: Future<Output = Result<()>>,
    {
        self.advance(ConnState::Closing);
        let close_timeout = self.cfg.close_timeout;
        let _ = ctl.send(Outbound::Close {
            frame: Frame::close(&CloseFrame::new(CloseCode::Normal, "")),
            drain: true,
        });

        // Our close goes out while we keep reading: data still in flight is
        // delivered until the peer answers.
        let closing = async {
            let mut sent = false;
            let mut answered = false;
            while !(sent && answered) {
                buf.reserve(READ_CHUNK);
                tokio::select! {
                    res = writer.as_mut(), if !sent => {
                        res?;
                        sent = true;
                    }
                    read = rd.read_buf(&mut buf), if !answered => {
                        if read? == 0 {
                            answered = true;
                        } else if let Some(close) = self.drain_frames(&mut buf, &mut asm, ctl)? {
                            tracing::debug!(code = ?close.code, "peer acknowledged close");
                            answered = true;
                        }
                    }
                }
            }
            Ok::<(), WsError>(())
        };

        match timeout(close_timeout, closing).await {
            Ok(res) => res,
            Err(_) => {
                tracing::debug!("peer did not answer close in time");
                Ok(())
            }
        }
    }

    /// Best-effort close frame for protocol violations, then give the error back.
    async fn fail<F>(&mut self, ctl: &Control, writer: Pin<&mut F>, err: WsError) -> WsError
    where
        F: Future<Output = Result<()>>,
    {
        if let WsError::Protocol(p) = &err {
            let close = CloseFrame::new(p.close_code(), p.to_string());
            let queued = ctl.send(Outbound::Close {
                frame: Frame::close(&close),
                drain: false,
            });
            if queued.is_ok() {
                let _ = timeout(self.cfg.close_timeout, writer).await;
            }
        }
        err
    }

    fn advance(&self, next: ConnState) {
        let prev = self.handle.shared.state.swap(next);
        tracing::debug!(from = %prev, to = %next, "state transition");
    }

    fn finish(mut self, result: Result<()>) {
        let prev = self.handle.state();
        match &result {
            Ok(()) => tracing::debug!(from = %prev, "connection closed"),
            Err(e) => tracing::warn!(
                from = %prev,
                kind = e.kind().as_str(),
                error = %e,
                "connection closed on error"
            ),
        }
        self.complete(true);
    }
}

impl<C> ConnectionTask<C> {
    /// Terminal transition. Runs at most once, so `on_close` fires once.
    fn complete(&mut self, notify: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.handle.shared.state.swap(ConnState::Closed);

        // Sends queued before the connection opened; once open, the writer
        // owns the queue and dropping it resolves their receipts.
        if let Some(mut cmds) = self.cmd_rx.take() {
            cmds.close();
            while let Ok(Command::Send { done, .. }) = cmds.try_recv() {
                let _ = done.send(Err(WsError::Closed));
            }
        }

        if let Some(hook) = self.on_finish.take() {
            hook(&self.handle);
        }
        if notify {
            self.handlers.call_close(&self.handle);
        }
    }
}

impl<C> Drop for ConnectionTask<C> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(conn_id = %self.handle.id(), "connection task dropped before closing");
            self.complete(!std::thread::panicking());
        }
    }
}

fn handshake_timed_out() -> WsError {
    WsError::Transport("handshake timed out".into())
}

async fn read_header_block<R>(rd: &mut R, max_header: usize) -> Result<HeaderBlock>
where
    R: AsyncRead + Unpin,
{
    let mut headers = HeaderBuffer::new(max_header);
    let mut chunk = [0u8; 1024];
    loop {
        let n = rd.read(&mut chunk).await?;
        if n == 0 {
            return Err(WsError::Transport("stream ended during handshake".into()));
        }
        if let Some(block) = headers.push(&chunk[..n])? {
            return Ok(block);
        }
    }
}

async fn client_handshake<S>(stream: &mut S, hs: &ClientHandshake, max_header: usize) -> Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&hs.request_bytes()).await?;
    stream.flush().await?;

    let block = read_header_block(stream, max_header).await?;
    let response = HttpResponse::parse(&block.head)?;
    hs.validate_response(&response)?;
    Ok(block.rest)
}

async fn server_handshake<S>(stream: &mut S, hs: &ServerHandshake, max_header: usize) -> Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = match read_header_block(stream, max_header).await {
        Ok(block) => HttpRequest::parse(&block.head)
            .and_then(|req| hs.accept(&req))
            .map(|accept_key| (accept_key, block.rest)),
        Err(WsError::Handshake(e)) => Err(e),
        Err(e) => return Err(e),
    };

    match outcome {
        Ok((accept_key, rest)) => {
            stream
                .write_all(&ServerHandshake::response_bytes(&accept_key))
                .await?;
            stream.flush().await?;
            Ok(rest)
        }
        Err(e) => {
            tracing::debug!(error = %e, status = e.status(), "rejecting upgrade");
            let _ = stream.write_all(&ServerHandshake::reject(&e)).await;
            let _ = stream.shutdown().await;
            Err(e.into())
        }
    }
}
