//! HTTP/1.1 Upgrade handshake (RFC 6455 Section 4).
//!
//! Both roles read the peer's header block through a [`HeaderBuffer`], which
//! tolerates headers split across any number of reads and bounds memory by a
//! maximum header size. Bytes that arrive after the blank line already belong
//! to the frame stream and are handed back to the caller.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::{Bytes, BytesMut};
use sha1::{Digest, Sha1};

use crate::error::HandshakeError;

/// Fixed GUID appended to the client key (RFC 6455 Section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version spoken.
pub const WS_VERSION: &str = "13";

/// Default bound on a header block.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8192;

const TERMINATOR: &[u8] = b"\r\n\r\n";

/// `base64(SHA-1(key + GUID))`.
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Random 16-byte nonce, base64 encoded.
pub fn generate_key() -> String {
    BASE64.encode(rand::random::<[u8; 16]>())
}

// --------------------
// Header accumulation
// --------------------

/// A complete header block plus whatever followed it in the same reads.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    /// Request/status line and headers, including the terminating blank line.
    pub head: Bytes,
    /// Bytes after the blank line (start of the frame stream).
    pub rest: Bytes,
}

/// Buffers input until the `\r\n\r\n` terminator.
#[derive(Debug)]
pub struct HeaderBuffer {
    buf: BytesMut,
    max: usize,
}

impl HeaderBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max,
        }
    }

    /// Bytes held so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append input. Returns the header block once the terminator is seen.
    pub fn push(&mut self, data: &[u8]) -> Result<Option<HeaderBlock>, HandshakeError> {
        // Only the tail can complete a terminator that was not there before.
        let search_from = self.buf.len().saturating_sub(TERMINATOR.len() - 1);
        self.buf.extend_from_slice(data);

        let found = self.buf[search_from..]
            .windows(TERMINATOR.len())
            .position(|w| w == TERMINATOR)
            .map(|p| search_from + p + TERMINATOR.len());

        match found {
            Some(end) if end <= self.max => {
                let head = self.buf.split_to(end).freeze();
                let rest = std::mem::take(&mut self.buf).freeze();
                Ok(Some(HeaderBlock { head, rest }))
            }
            Some(_) => Err(HandshakeError::HeaderTooLarge { max: self.max }),
            None if self.buf.len() > self.max => {
                Err(HandshakeError::HeaderTooLarge { max: self.max })
            }
            None => Ok(None),
        }
    }
}

// --------------------
// Minimal HTTP parsing
// --------------------

fn parse_headers<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> Result<Vec<(String, String)>, HandshakeError> {
    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HandshakeError::Malformed(format!("header line without colon: {line}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(headers)
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Comma-separated token list contains `token` (case-insensitive).
fn has_token(value: &str, token: &str) -> bool {
    value.split(',').any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn utf8(data: &[u8]) -> Result<&str, HandshakeError> {
    std::str::from_utf8(data).map_err(|_| HandshakeError::Malformed("header is not UTF-8".into()))
}

/// Parsed request line and headers.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    /// Request target as sent, query string included.
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn parse(data: &[u8]) -> Result<Self, HandshakeError> {
        let text = utf8(data)?;
        let mut lines = text.split("\r\n");

        let request_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| HandshakeError::Malformed("empty request".into()))?;
        let mut parts = request_line.split(' ');
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(HandshakeError::Malformed(format!(
                "bad request line: {request_line}"
            )));
        };
        if !version.starts_with("HTTP/1.") {
            return Err(HandshakeError::Malformed(format!("unsupported http version: {version}")));
        }

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers: parse_headers(lines)?,
        })
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Target without its query string.
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("")
    }
}

/// Parsed status line and headers.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn parse(data: &[u8]) -> Result<Self, HandshakeError> {
        let text = utf8(data)?;
        let mut lines = text.split("\r\n");

        let status_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| HandshakeError::Malformed("empty response".into()))?;
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        if !version.starts_with("HTTP/1.") {
            return Err(HandshakeError::Malformed(format!("bad status line: {status_line}")));
        }
        let status = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| HandshakeError::Malformed(format!("bad status line: {status_line}")))?;
        let reason = parts.next().unwrap_or("").to_string();

        Ok(Self {
            status,
            reason,
            headers: parse_headers(lines)?,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

// --------------------
// URL
// --------------------

/// Parsed `ws://host[:port]/path` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl WsUrl {
    /// Parse a plain `ws://` URL. `wss://` is refused: transport security
    /// is supplied outside this crate.
    pub fn parse(url: &str) -> Result<Self, HandshakeError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| HandshakeError::InvalidUrl("missing scheme".into()))?;
        if !scheme.eq_ignore_ascii_case("ws") {
            return Err(HandshakeError::InvalidUrl(format!("unsupported scheme: {scheme}")));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, "/"),
        };

        let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
            let (host, after) = v6
                .split_once(']')
                .ok_or_else(|| HandshakeError::InvalidUrl("unterminated IPv6 host".into()))?;
            let port = match after.strip_prefix(':') {
                Some(p) => parse_port(p)?,
                None if after.is_empty() => 80,
                None => return Err(HandshakeError::InvalidUrl(format!("bad authority: {authority}"))),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, p)) => (host, parse_port(p)?),
                None => (authority, 80),
            }
        };

        if host.is_empty() {
            return Err(HandshakeError::InvalidUrl("empty host".into()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

fn parse_port(s: &str) -> Result<u16, HandshakeError> {
    s.parse()
        .map_err(|_| HandshakeError::InvalidUrl(format!("invalid port: {s}")))
}

fn host_header(host: &str, port: u16) -> String {
    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    if port == 80 {
        host
    } else {
        format!("{host}:{port}")
    }
}

// --------------------
// Client role
// --------------------

/// Client side of the Upgrade exchange.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    host: String,
    port: u16,
    path: String,
    key: String,
}

impl ClientHandshake {
    /// New handshake with a fresh random key.
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self::with_key(host, port, path, generate_key())
    }

    /// Handshake with a caller-chosen key (canned exchanges in tests).
    pub fn with_key(
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            host: host.into(),
            port,
            path,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn request_bytes(&self) -> Vec<u8> {
        format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: {}\r\n\
             \r\n",
            self.path,
            host_header(&self.host, self.port),
            self.key,
            WS_VERSION,
        )
        .into_bytes()
    }

    /// Check the server's answer: status 101, upgrade headers and the accept
    /// value derived from our key.
    pub fn validate_response(&self, response: &HttpResponse) -> Result<(), HandshakeError> {
        if response.status != 101 {
            return Err(HandshakeError::BadStatus(response.status));
        }

        let upgrade = response
            .header("Upgrade")
            .ok_or(HandshakeError::MissingHeader("Upgrade"))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(HandshakeError::InvalidHeader {
                name: "Upgrade",
                value: upgrade.to_string(),
            });
        }

        let connection = response
            .header("Connection")
            .ok_or(HandshakeError::MissingHeader("Connection"))?;
        if !has_token(connection, "upgrade") {
            return Err(HandshakeError::InvalidHeader {
                name: "Connection",
                value: connection.to_string(),
            });
        }

        let accept = response
            .header("Sec-WebSocket-Accept")
            .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Accept"))?;
        let expected = compute_accept_key(&self.key);
        if accept != expected {
            return Err(HandshakeError::AcceptMismatch {
                expected,
                actual: accept.to_string(),
            });
        }

        Ok(())
    }
}

// --------------------
// Server role
// --------------------

/// Server side of the Upgrade exchange for one endpoint path.
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    path: String,
}

impl ServerHandshake {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Validate an Upgrade request. Returns the `Sec-WebSocket-Accept` value.
    pub fn accept(&self, req: &HttpRequest) -> Result<String, HandshakeError> {
        if req.method != "GET" {
            return Err(HandshakeError::Malformed(format!(
                "method must be GET, got {}",
                req.method
            )));
        }
        if req.path() != self.path {
            return Err(HandshakeError::PathNotFound(req.path().to_string()));
        }

        match req.header("Upgrade") {
            Some(v) if has_token(v, "websocket") => {}
            Some(v) => {
                return Err(HandshakeError::InvalidHeader {
                    name: "Upgrade",
                    value: v.to_string(),
                })
            }
            None => return Err(HandshakeError::MissingHeader("Upgrade")),
        }

        match req.header("Connection") {
            Some(v) if has_token(v, "upgrade") => {}
            Some(v) => {
                return Err(HandshakeError::InvalidHeader {
                    name: "Connection",
                    value: v.to_string(),
                })
            }
            None => return Err(HandshakeError::MissingHeader("Connection")),
        }

        match req.header("Sec-WebSocket-Version") {
            Some(WS_VERSION) => {}
            Some(v) => return Err(HandshakeError::UnsupportedVersion(v.to_string())),
            None => return Err(HandshakeError::MissingHeader("Sec-WebSocket-Version")),
        }

        let key = req
            .header("Sec-WebSocket-Key")
            .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key"))?;
        match BASE64.decode(key) {
            Ok(nonce) if nonce.len() == 16 => {}
            _ => {
                return Err(HandshakeError::InvalidHeader {
                    name: "Sec-WebSocket-Key",
                    value: key.to_string(),
                })
            }
        }

        Ok(compute_accept_key(key))
    }

    /// `101 Switching Protocols` carrying the accept value.
    pub fn response_bytes(accept_key: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {accept_key}\r\n\
             \r\n"
        )
        .into_bytes()
    }

    /// Error response for a rejected handshake (400, or 404 for an unknown path).
    pub fn reject(err: &HandshakeError) -> Vec<u8> {
        let status = err.status();
        let reason = match status {
            404 => "Not Found",
            _ => "Bad Request",
        };
        let version_hint = match err {
            HandshakeError::UnsupportedVersion(_) => "Sec-WebSocket-Version: 13\r\n",
            _ => "",
        };
        let body = format!("{reason}: {err}");
        format!(
            "HTTP/1.1 {status} {reason}\r\n\
             Content-Type: text/plain\r\n\
             Content-Length: {}\r\n\
             {version_hint}\
             Connection: close\r\n\
             \r\n\
             {body}",
            body.len(),
        )
        .into_bytes()
    }
}
