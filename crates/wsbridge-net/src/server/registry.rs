use dashmap::DashMap;

use crate::connection::{ConnectionHandle, ConnectionId};

/// Live connections spawned by one listener, keyed by id.
///
/// Entries are inserted by the accept loop and removed by the connection's
/// own task when it reaches `closed`.
#[derive(Default)]
pub(crate) struct ConnectionRegistry {
    conns: DashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            conns: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, conn: ConnectionHandle) {
        self.conns.insert(conn.id(), conn);
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.conns.remove(&id).map(|(_, conn)| conn)
    }

    pub(crate) fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.conns.iter().map(|r| r.value().clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.conns.len()
    }

    /// Request closure of every registered connection.
    pub(crate) fn close_all(&self) -> usize {
        let conns = self.snapshot();
        for conn in &conns {
            conn.close();
        }
        conns.len()
    }
}
