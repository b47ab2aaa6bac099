use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};

use super::{Accept, Transport};
use crate::config::TcpSection;

/// Plain TCP connector. Resolves through the system resolver and tries each
/// address in order until one connects.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    nodelay: bool,
    keepalive: bool,
}

impl TcpTransport {
    pub fn new(cfg: &TcpSection) -> Self {
        Self {
            nodelay: cfg.nodelay,
            keepalive: cfg.keepalive,
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(&TcpSection::default())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in lookup_host((host, port)).await? {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_keepalive(self.keepalive)?;
            socket.set_nodelay(self.nodelay)?;

            match socket.connect(addr).await {
                Ok(stream) => {
                    tracing::debug!(%addr, "tcp connected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "tcp connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {host}:{port}"),
            )
        }))
    }
}

/// Listening socket with the `tcp` section applied. Keepalive is set on the
/// listening socket and inherited by accepted streams; nodelay is set per
/// stream.
#[derive(Debug)]
pub(crate) struct TcpAcceptor {
    tcp: TcpListener,
    nodelay: bool,
}

impl TcpAcceptor {
    pub(crate) fn bind(addr: SocketAddr, cfg: &TcpSection) -> io::Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        #[cfg(unix)]
        socket.set_reuseaddr(true)?;
        socket.set_keepalive(cfg.keepalive)?;
        socket.bind(addr)?;
        Ok(Self {
            tcp: socket.listen(1024)?,
            nodelay: cfg.nodelay,
        })
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }
}

#[async_trait]
impl Accept for TcpAcceptor {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.tcp.accept().await?;
        if let Err(e) = stream.set_nodelay(self.nodelay) {
            tracing::debug!(%peer, error = %e, "set_nodelay failed");
        }
        Ok((stream, peer))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepted_streams_carry_socket_options() {
        let cfg = TcpSection {
            nodelay: true,
            keepalive: true,
        };
        let mut acceptor = TcpAcceptor::bind("127.0.0.1:0".parse().unwrap(), &cfg).unwrap();
        let addr = acceptor.local_addr().unwrap();

        let (client, accepted) = tokio::join!(TcpStream::connect(addr), acceptor.accept());
        let _client = client.unwrap();
        let (stream, _) = accepted.unwrap();
        assert!(stream.nodelay().unwrap());

        let socket = TcpSocket::from_std_stream(stream.into_std().unwrap());
        assert!(socket.keepalive().unwrap());
    }

    #[tokio::test]
    async fn keepalive_can_be_disabled() {
        let cfg = TcpSection {
            nodelay: false,
            keepalive: false,
        };
        let mut acceptor = TcpAcceptor::bind("127.0.0.1:0".parse().unwrap(), &cfg).unwrap();
        let addr = acceptor.local_addr().unwrap();

        let (client, accepted) = tokio::join!(TcpStream::connect(addr), acceptor.accept());
        let _client = client.unwrap();
        let (stream, _) = accepted.unwrap();
        assert!(!stream.nodelay().unwrap());

        let socket = TcpSocket::from_std_stream(stream.into_std().unwrap());
        assert!(!socket.keepalive().unwrap());
    }
}
