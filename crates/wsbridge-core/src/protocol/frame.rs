//! WebSocket frame codec (RFC 6455 Section 5).
//!
//! Parsing rules:
//! - Never index raw input; read through `bytes::Buf` after `remaining()` checks.
//! - Incomplete input is `Decoded::NeedMoreData`, never an error. The caller
//!   keeps the unconsumed bytes and retries once more arrive.
//! - The decoder is stateless: every call starts from the frame header, so
//!   feeding one byte at a time yields the same frame as feeding all at once.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::close::CloseFrame;
use crate::protocol::Role;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest possible header: 2 fixed + 8 extended length + 4 mask key.
pub const MAX_HEADER_LEN: usize = 14;

/// Frame opcodes (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Parse the low nibble of the first header byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(ProtocolError::InvalidOpcode(other)),
        }
    }

    /// Close, Ping and Pong.
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// Continuation, Text and Binary.
    pub fn is_data(self) -> bool {
        !self.is_control()
    }
}

/// A single frame. Payloads are always stored unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of a message.
    pub fin: bool,
    pub opcode: Opcode,
    /// Key the frame was masked with on the wire (client-originated only).
    pub mask: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    /// Unfragmented frame with the given opcode.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// One fragment of a larger message. `opcode` is `Text`/`Binary` for the
    /// first fragment and `Continuation` afterwards.
    pub fn fragment(opcode: Opcode, payload: impl Into<Bytes>, fin: bool) -> Self {
        Self {
            fin,
            ..Self::new(opcode, payload)
        }
    }

    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    pub fn close(close: &CloseFrame) -> Self {
        Self::new(Opcode::Close, close.encode())
    }
}

/// Outcome of a successful decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame occupying the first `consumed` input bytes.
    Frame { frame: Frame, consumed: usize },
    /// The buffer holds only part of a frame.
    NeedMoreData,
}

/// XOR the payload with the repeating 4-byte key. Symmetric.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Fresh per-frame masking key.
pub fn random_mask() -> [u8; 4] {
    rand::random::<[u8; 4]>()
}

/// Encode an unfragmented frame. Client frames get a random mask key,
/// server frames are sent unmasked.
pub fn encode(opcode: Opcode, payload: &[u8], is_client: bool) -> Bytes {
    let frame = Frame::new(opcode, Bytes::copy_from_slice(payload));
    let mask = is_client.then(random_mask);
    let mut out = BytesMut::with_capacity(MAX_HEADER_LEN + payload.len());
    encode_frame(&frame, mask, &mut out);
    out.freeze()
}

/// Append the wire form of `frame` to `out`, masking with `mask` if given.
///
/// `frame.mask` is ignored; the key is chosen by the sender per write.
pub fn encode_frame(frame: &Frame, mask: Option<[u8; 4]>, out: &mut BytesMut) {
    let len = frame.payload.len();
    out.reserve(MAX_HEADER_LEN + len);

    let fin_bit = if frame.fin { 0x80 } else { 0x00 };
    out.put_u8(fin_bit | frame.opcode as u8);

    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    if len <= MAX_CONTROL_PAYLOAD {
        out.put_u8(mask_bit | len as u8);
    } else if len <= usize::from(u16::MAX) {
        out.put_u8(mask_bit | 126);
        out.put_u16(len as u16);
    } else {
        out.put_u8(mask_bit | 127);
        out.put_u64(len as u64);
    }

    match mask {
        Some(key) => {
            out.put_slice(&key);
            let start = out.len();
            out.put_slice(&frame.payload);
            apply_mask(&mut out[start..], key);
        }
        None => out.put_slice(&frame.payload),
    }
}

/// Decode one frame from the front of `buf`.
///
/// `role` is the role of the decoding endpoint: a server requires masked
/// frames, a client rejects them. `max_payload` caps a single frame.
pub fn decode(buf: &[u8], role: Role, max_payload: usize) -> Result<Decoded, ProtocolError> {
    let mut cur = buf;
    if cur.remaining() < 2 {
        return Ok(Decoded::NeedMoreData);
    }

    let b0 = cur.get_u8();
    let b1 = cur.get_u8();

    let fin = (b0 & 0x80) != 0;
    if (b0 & 0x70) != 0 {
        return Err(ProtocolError::ReservedBits);
    }
    let opcode = Opcode::from_u8(b0 & 0x0F)?;

    let masked = (b1 & 0x80) != 0;
    match (role, masked) {
        (Role::Server, false) => return Err(ProtocolError::UnmaskedClientFrame),
        (Role::Client, true) => return Err(ProtocolError::MaskedServerFrame),
        _ => {}
    }

    if opcode.is_control() && !fin {
        return Err(ProtocolError::FragmentedControl);
    }

    let len: u64 = match b1 & 0x7F {
        126 => {
            if cur.remaining() < 2 {
                return Ok(Decoded::NeedMoreData);
            }
            u64::from(cur.get_u16())
        }
        127 => {
            if cur.remaining() < 8 {
                return Ok(Decoded::NeedMoreData);
            }
            let len = cur.get_u64();
            if len >> 63 != 0 {
                return Err(ProtocolError::LengthOverflow);
            }
            len
        }
        short => u64::from(short),
    };

    if opcode.is_control() && len > MAX_CONTROL_PAYLOAD as u64 {
        return Err(ProtocolError::ControlFrameTooLarge(
            usize::try_from(len).unwrap_or(usize::MAX),
        ));
    }
    let too_large = ProtocolError::PayloadTooLarge {
        size: len,
        max: max_payload,
    };
    if len > max_payload as u64 {
        return Err(too_large);
    }
    let len = usize::try_from(len).map_err(|_| too_large)?;

    let mask = if masked {
        if cur.remaining() < 4 {
            return Ok(Decoded::NeedMoreData);
        }
        let mut key = [0u8; 4];
        cur.copy_to_slice(&mut key);
        Some(key)
    } else {
        None
    };

    if cur.remaining() < len {
        return Ok(Decoded::NeedMoreData);
    }
    let mut payload = vec![0u8; len];
    cur.copy_to_slice(&mut payload);
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    let consumed = buf.len() - cur.remaining();
    Ok(Decoded::Frame {
        frame: Frame {
            fin,
            opcode,
            mask,
            payload: Bytes::from(payload),
        },
        consumed,
    })
}
