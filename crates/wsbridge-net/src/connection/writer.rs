//! Write side of an open connection.
//!
//! The writer is a future the driver polls next to its reads, so a peer that
//! stops reading stalls only our writes, never our receive loop.

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use wsbridge_core::error::{Result, WsError};
use wsbridge_core::protocol::frame::{encode_frame, random_mask, Frame};
use wsbridge_core::Role;

use super::handle::Command;

/// Frames the driver itself puts on the wire.
pub(super) enum Outbound {
    /// Written ahead of queued application sends (pongs).
    Control(Frame),
    /// Last frame on the wire. With `drain`, queued sends go out first.
    Close { frame: Frame, drain: bool },
}

pub(super) struct Writer<W> {
    wr: W,
    role: Role,
    cmds: mpsc::Receiver<Command>,
    ctl: mpsc::UnboundedReceiver<Outbound>,
}

impl<W: AsyncWrite + Unpin> Writer<W> {
    pub(super) fn new(
        wr: W,
        role: Role,
        cmds: mpsc::Receiver<Command>,
        ctl: mpsc::UnboundedReceiver<Outbound>,
    ) -> Self {
        Self {
            wr,
            role,
            cmds,
            ctl,
        }
    }

    /// Runs until the close frame is written. A write error ends it early.
    pub(super) async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                out = self.ctl.recv() => match out {
                    Some(Outbound::Control(frame)) => {
                        write_frame(&mut self.wr, &frame, self.role).await?;
                    }
                    Some(Outbound::Close { frame, drain }) => {
                        if drain {
                            while let Ok(cmd) = self.cmds.try_recv() {
                                self.execute(cmd).await?;
                            }
                        }
                        write_frame(&mut self.wr, &frame, self.role).await?;
                        let _ = self.wr.shutdown().await;
                        return Ok(());
                    }
                    None => return Ok(()),
                },
                cmd = self.cmds.recv() => match cmd {
                    Some(cmd) => self.execute(cmd).await?,
                    None => return Ok(()),
                },
            }
        }
    }

    async fn execute(&mut self, cmd: Command) -> Result<()> {
        match cmd {
            Command::Send { frame, done } => {
                match write_frame(&mut self.wr, &frame, self.role).await {
                    Ok(()) => {
                        let _ = done.send(Ok(()));
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "write failed");
                        let _ = done.send(Err(WsError::Transport(e.to_string())));
                        Err(e)
                    }
                }
            }
        }
    }
}

async fn write_frame<W>(wr: &mut W, frame: &Frame, role: Role) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mask = role.is_client().then(random_mask);
    let mut out = BytesMut::new();
    encode_frame(frame, mask, &mut out);
    wr.write_all(&out).await?;
    wr.flush().await?;
    Ok(())
}
