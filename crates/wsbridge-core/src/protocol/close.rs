//! Close frame payloads (RFC 6455 Section 5.5.1 / 7.4).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::frame::MAX_CONTROL_PAYLOAD;

/// Close status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000
    Normal,
    /// 1001
    GoingAway,
    /// 1002
    Protocol,
    /// 1003
    Unsupported,
    /// 1007
    InvalidPayload,
    /// 1008
    Policy,
    /// 1009
    TooBig,
    /// 1011
    Internal,
    /// Any other code received from a peer.
    Other(u16),
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::InvalidPayload => 1007,
            CloseCode::Policy => 1008,
            CloseCode::TooBig => 1009,
            CloseCode::Internal => 1011,
            CloseCode::Other(code) => code,
        }
    }

    /// Whether the code may appear on the wire. 1004-1006 and 1015 are
    /// reserved for local use, below 1000 and 1016-2999 are unassigned.
    pub fn is_valid_on_wire(self) -> bool {
        matches!(self.as_u16(), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::Protocol,
            1003 => CloseCode::Unsupported,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::Policy,
            1009 => CloseCode::TooBig,
            1011 => CloseCode::Internal,
            other => CloseCode::Other(other),
        }
    }
}

/// Parsed body of a close frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseFrame {
    /// `None` for an empty close payload.
    pub code: Option<CloseCode>,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut cur = payload;
        match cur.remaining() {
            0 => return Ok(Self::default()),
            1 => return Err(ProtocolError::InvalidClosePayload),
            _ => {}
        }

        let code = CloseCode::from(cur.get_u16());
        if !code.is_valid_on_wire() {
            return Err(ProtocolError::InvalidClosePayload);
        }
        let reason = std::str::from_utf8(cur)
            .map_err(|_| ProtocolError::InvalidClosePayload)?
            .to_string();

        Ok(Self {
            code: Some(code),
            reason,
        })
    }

    /// Wire payload. Reasons longer than the control frame limit are cut at a
    /// character boundary.
    pub fn encode(&self) -> Bytes {
        let Some(code) = self.code else {
            return Bytes::new();
        };

        let mut reason = self.reason.as_str();
        let max_reason = MAX_CONTROL_PAYLOAD - 2;
        if reason.len() > max_reason {
            let mut end = max_reason;
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason = &reason[..end];
        }

        let mut buf = BytesMut::with_capacity(2 + reason.len());
        buf.put_u16(code.as_u16());
        buf.put_slice(reason.as_bytes());
        buf.freeze()
    }

    /// Close frame sent back to acknowledge `self`.
    pub fn echo(&self) -> CloseFrame {
        CloseFrame::new(self.code.unwrap_or(CloseCode::Normal), "")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_has_no_code() {
        let c = CloseFrame::parse(&[]).unwrap();
        assert_eq!(c.code, None);
        assert!(c.encode().is_empty());
    }

    #[test]
    fn single_byte_payload_is_invalid() {
        assert_eq!(
            CloseFrame::parse(&[0x03]),
            Err(ProtocolError::InvalidClosePayload)
        );
    }

    #[test]
    fn reserved_codes_are_rejected() {
        for code in [999u16, 1005, 1006, 1015, 2000] {
            let payload = code.to_be_bytes();
            assert!(CloseFrame::parse(&payload).is_err(), "code {code}");
        }
    }

    #[test]
    fn code_and_reason_survive_encoding() {
        let c = CloseFrame::new(CloseCode::GoingAway, "bye");
        let parsed = CloseFrame::parse(&c.encode()).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn long_reason_is_truncated_on_char_boundary() {
        let c = CloseFrame::new(CloseCode::Normal, "é".repeat(100));
        let wire = c.encode();
        assert!(wire.len() <= MAX_CONTROL_PAYLOAD);
        assert!(CloseFrame::parse(&wire).is_ok());
    }

    #[test]
    fn echo_defaults_to_normal() {
        assert_eq!(CloseFrame::default().echo().code, Some(CloseCode::Normal));
    }
}
