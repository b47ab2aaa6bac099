//! Connection state machine.
//!
//! Each connection is driven by exactly one tokio task (`driver`), which owns
//! the stream, the receive buffer and the fragment assembler, and is the only
//! place callbacks are invoked from. Applications hold a non-owning
//! [`ConnectionHandle`] to query state, queue sends and request closure.

mod driver;
mod handle;
mod state;
mod writer;

pub(crate) use driver::ConnectionTask;
pub use handle::{ConnectionHandle, ConnectionId, WriteReceipt};
pub use state::ConnState;
