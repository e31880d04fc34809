//! Registry of live connections keyed by execution id.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{Connection, ConnectionId};

/// Tracks subscriber handles per execution id, the wildcard id included.
///
/// Not synchronized on its own; the store guards it together with the
/// history and metadata tables.
#[derive(Default)]
pub struct ConnectionRegistry {
    by_execution: HashMap<String, HashMap<ConnectionId, Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Adding the same handle twice is a no-op.
    pub fn add(&mut self, execution_id: &str, conn: Arc<dyn Connection>) {
        self.by_execution
            .entry(execution_id.to_string())
            .or_default()
            .insert(conn.id(), conn);
    }

    /// Unregister a connection. Drops the id once its last subscriber leaves.
    ///
    /// Returns true if the connection was registered.
    pub fn remove(&mut self, execution_id: &str, conn_id: ConnectionId) -> bool {
        let Some(conns) = self.by_execution.get_mut(execution_id) else {
            return false;
        };
        let removed = conns.remove(&conn_id).is_some();
        if conns.is_empty() {
            self.by_execution.remove(execution_id);
        }
        removed
    }

    /// Snapshot of the subscribers for one id. Empty if absent.
    pub fn get(&self, execution_id: &str) -> Vec<Arc<dyn Connection>> {
        self.by_execution
            .get(execution_id)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the id has at least one subscriber. Empty sets are never kept.
    pub fn has_subscribers(&self, execution_id: &str) -> bool {
        self.by_execution.contains_key(execution_id)
    }

    /// Drop every subscriber for an id.
    pub fn remove_execution(&mut self, execution_id: &str) {
        self.by_execution.remove(execution_id);
    }

    /// Total subscriber count across all ids.
    pub fn count(&self) -> usize {
        self.by_execution.values().map(HashMap::len).sum()
    }

    pub fn clear(&mut self) {
        self.by_execution.clear();
    }
}
