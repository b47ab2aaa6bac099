//! Shared error types across wsbridge crates.

use thiserror::Error;

use crate::protocol::close::CloseCode;

/// Stable error kinds surfaced to applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect/read/write failure from the transport provider.
    Transport,
    /// Malformed or rejected Upgrade exchange.
    Handshake,
    /// Malformed frame or message.
    Protocol,
    /// Operation attempted after closure.
    Closed,
    /// The connection's send queue is full.
    QueueFull,
    /// Invalid configuration.
    Config,
}

impl ErrorKind {
    /// String representation used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Handshake => "HANDSHAKE",
            ErrorKind::Protocol => "PROTOCOL",
            ErrorKind::Closed => "CLOSED",
            ErrorKind::QueueFull => "QUEUE_FULL",
            ErrorKind::Config => "CONFIG",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, WsError>;

/// Unified error type used by core and runtime.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("handshake: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("connection closed")]
    Closed,
    #[error("send queue full ({capacity} pending)")]
    QueueFull { capacity: usize },
    #[error("config: {0}")]
    Config(String),
}

impl WsError {
    /// Map the error to its stable kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WsError::Transport(_) => ErrorKind::Transport,
            WsError::Handshake(_) => ErrorKind::Handshake,
            WsError::Protocol(_) => ErrorKind::Protocol,
            WsError::Closed => ErrorKind::Closed,
            WsError::QueueFull { .. } => ErrorKind::QueueFull,
            WsError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<std::io::Error> for WsError {
    fn from(e: std::io::Error) -> Self {
        WsError::Transport(e.to_string())
    }
}

/// Frame or message level violation of RFC 6455.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid opcode: 0x{0:X}")]
    InvalidOpcode(u8),
    #[error("reserved bits set without a negotiated extension")]
    ReservedBits,
    #[error("control frame payload too large: {0} bytes (max 125)")]
    ControlFrameTooLarge(usize),
    #[error("control frame must not be fragmented")]
    FragmentedControl,
    #[error("client frame must be masked")]
    UnmaskedClientFrame,
    #[error("server frame must not be masked")]
    MaskedServerFrame,
    #[error("64-bit payload length has the most significant bit set")]
    LengthOverflow,
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u64, max: usize },
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,
    #[error("new data frame while a fragmented message is in progress")]
    ExpectedContinuation,
    #[error("invalid UTF-8 in text message")]
    InvalidUtf8,
    #[error("invalid close frame payload")]
    InvalidClosePayload,
}

impl ProtocolError {
    /// Status code carried by the close frame sent in response.
    pub fn close_code(&self) -> CloseCode {
        match self {
            ProtocolError::PayloadTooLarge { .. } => CloseCode::TooBig,
            ProtocolError::InvalidUtf8 => CloseCode::InvalidPayload,
            _ => CloseCode::Protocol,
        }
    }
}

/// Failure during the HTTP Upgrade exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("header block exceeds {max} bytes")]
    HeaderTooLarge { max: usize },
    #[error("malformed http: {0}")]
    Malformed(String),
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
    #[error("invalid header {name}: {value}")]
    InvalidHeader { name: &'static str, value: String },
    #[error("expected status 101, got {0}")]
    BadStatus(u16),
    #[error("Sec-WebSocket-Accept mismatch: expected {expected}, got {actual}")]
    AcceptMismatch { expected: String, actual: String },
    #[error("no websocket endpoint at {0}")]
    PathNotFound(String),
    #[error("unsupported websocket version: {0}")]
    UnsupportedVersion(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl HandshakeError {
    /// HTTP status a server answers with when rejecting for this reason.
    pub fn status(&self) -> u16 {
        match self {
            HandshakeError::PathNotFound(_) => 404,
            _ => 400,
        }
    }
}
