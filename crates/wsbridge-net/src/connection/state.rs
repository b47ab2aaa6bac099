use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle: `Connecting -> Handshaking -> Open -> Closing -> Closed`.
/// Any state may jump straight to `Closed` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ConnState {
    Connecting = 0,
    Handshaking = 1,
    Open = 2,
    Closing = 3,
    Closed = 4,
}

impl ConnState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnState::Connecting => "connecting",
            ConnState::Handshaking => "handshaking",
            ConnState::Open => "open",
            ConnState::Closing => "closing",
            ConnState::Closed => "closed",
        }
    }

    /// New application sends are refused from `Closing` on.
    pub fn accepts_sends(self) -> bool {
        self < ConnState::Closing
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnState::Connecting,
            1 => ConnState::Handshaking,
            2 => ConnState::Open,
            3 => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State readable from any handle, written only by the driver.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(s: ConnState) -> Self {
        Self(AtomicU8::new(s as u8))
    }

    pub(crate) fn load(&self) -> ConnState {
        ConnState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store `next`, returning the previous state.
    pub(crate) fn swap(&self, next: ConnState) -> ConnState {
        ConnState::from_u8(self.0.swap(next as u8, Ordering::AcqRel))
    }
}
