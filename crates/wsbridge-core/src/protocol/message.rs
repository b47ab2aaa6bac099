//! Reassembly of fragmented data frames into logical messages.
//!
//! One assembler belongs to one connection. Control frames may arrive between
//! the fragments of a data message; the caller handles those directly and the
//! in-flight message is left untouched.

use bytes::{Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::frame::{Frame, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

/// A complete application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Message {
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: Bytes::from(s.into()),
        }
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: payload.into(),
        }
    }

    /// Text payload; `None` for binary messages. Text is validated on assembly.
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Text => std::str::from_utf8(&self.payload).ok(),
            MessageKind::Binary => None,
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self.kind {
            MessageKind::Text => Opcode::Text,
            MessageKind::Binary => Opcode::Binary,
        }
    }
}

#[derive(Debug)]
struct Partial {
    kind: MessageKind,
    buf: BytesMut,
}

/// Fragment accumulator.
#[derive(Debug)]
pub struct MessageAssembler {
    max_message: usize,
    partial: Option<Partial>,
}

impl MessageAssembler {
    pub fn new(max_message: usize) -> Self {
        Self {
            max_message,
            partial: None,
        }
    }

    /// True while a fragmented message awaits its final frame.
    pub fn in_progress(&self) -> bool {
        self.partial.is_some()
    }

    /// Drop any partially received message.
    pub fn reset(&mut self) {
        self.partial = None;
    }

    /// Feed one data frame. Returns the message once its final fragment is in.
    ///
    /// Control frames are not part of any message and yield `Ok(None)`.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>, ProtocolError> {
        let kind = match frame.opcode {
            Opcode::Text => MessageKind::Text,
            Opcode::Binary => MessageKind::Binary,
            Opcode::Continuation => return self.push_continuation(frame),
            Opcode::Close | Opcode::Ping | Opcode::Pong => return Ok(None),
        };

        if self.partial.is_some() {
            return Err(ProtocolError::ExpectedContinuation);
        }
        self.check_size(frame.payload.len())?;

        if frame.fin {
            return finish(kind, frame.payload).map(Some);
        }

        let mut buf = BytesMut::with_capacity(frame.payload.len());
        buf.extend_from_slice(&frame.payload);
        self.partial = Some(Partial { kind, buf });
        Ok(None)
    }

    fn push_continuation(&mut self, frame: Frame) -> Result<Option<Message>, ProtocolError> {
        let held = match &self.partial {
            Some(p) => p.buf.len(),
            None => return Err(ProtocolError::UnexpectedContinuation),
        };
        self.check_size(held.saturating_add(frame.payload.len()))?;

        let Some(partial) = self.partial.as_mut() else {
            return Err(ProtocolError::UnexpectedContinuation);
        };
        partial.buf.extend_from_slice(&frame.payload);

        if !frame.fin {
            return Ok(None);
        }
        match self.partial.take() {
            Some(p) => finish(p.kind, p.buf.freeze()).map(Some),
            None => Err(ProtocolError::UnexpectedContinuation),
        }
    }

    fn check_size(&self, size: usize) -> Result<(), ProtocolError> {
        if size > self.max_message {
            return Err(ProtocolError::PayloadTooLarge {
                size: size as u64,
                max: self.max_message,
            });
        }
        Ok(())
    }
}

fn finish(kind: MessageKind, payload: Bytes) -> Result<Message, ProtocolError> {
    if kind == MessageKind::Text && std::str::from_utf8(&payload).is_err() {
        return Err(ProtocolError::InvalidUtf8);
    }
    Ok(Message { kind, payload })
}
