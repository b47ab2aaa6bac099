//! RFC 6455 protocol modules.
//!
//! - `frame`: wire framing (masking, length encodings, control rules)
//! - `message`: reassembly of fragmented data frames into messages
//! - `close`: close frame payloads and status codes
//! - `handshake`: HTTP/1.1 Upgrade exchange for both roles
//!
//! All parsers are panic-free and work on plain byte buffers. Malformed
//! input is reported as `ProtocolError` / `HandshakeError`.

pub mod close;
pub mod frame;
pub mod handshake;
pub mod message;

/// Which side of the connection this endpoint plays.
///
/// The role decides masking: clients mask every frame they send and servers
/// never do, so a decoder rejects frames that break the rule for its peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn is_client(self) -> bool {
        matches!(self, Role::Client)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }
}
