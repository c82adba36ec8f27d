use std::collections::HashMap;

use parking_lot::RwLock;

use super::connection::ConnectionHandle;

// -----------------------------------------------------------------------------
// ----- ConnectionRegistry ----------------------------------------------------

/// Principal id → its single live connection.
///
/// Reads share the lock, writes take it exclusively. Nothing awaits or does
/// I/O while holding it; callers get clones out and send afterwards.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<i64, ConnectionHandle>>,
}

// -----------------------------------------------------------------------------
// ----- ConnectionRegistry: Public --------------------------------------------

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `principal`, returning the handle it replaced.
    /// Disposing of the replaced connection is the caller's job.
    pub fn insert(&self, principal: i64, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.connections.write().insert(principal, handle)
    }

    pub fn get(&self, principal: i64) -> Option<ConnectionHandle> {
        self.connections.read().get(&principal).cloned()
    }

    pub fn remove(&self, principal: i64) -> Option<ConnectionHandle> {
        self.connections.write().remove(&principal)
    }

    /// Remove the entry for `principal` only if it is still connection
    /// `connection_id`. A replaced connection's cleanup must not evict its
    /// successor.
    pub fn remove_if_current(&self, principal: i64, connection_id: u64) -> bool {
        let mut guard = self.connections.write();
        match guard.get(&principal) {
            Some(current) if current.id() == connection_id => {
                guard.remove(&principal);
                true
            }
            _ => false,
        }
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> Vec<(i64, ConnectionHandle)> {
        self.connections
            .read()
            .iter()
            .map(|(principal, handle)| (*principal, handle.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
