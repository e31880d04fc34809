//! Bounded per-execution update history for late joiners.

use crate::types::{StreamUpdate, MAX_HISTORY};
use std::collections::{HashMap, VecDeque};

/// Ordered log of updates per execution, oldest first.
///
/// Each list is capped; appending past the cap drops from the front.
pub struct HistoryBuffer {
    capacity: usize,
    entries: HashMap<String, VecDeque<StreamUpdate>>,
}

impl HistoryBuffer {
    /// Buffer retaining [`MAX_HISTORY`] updates per execution.
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }

    /// Buffer retaining `capacity` updates per execution (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    /// Append an update, evicting the oldest entries past capacity.
    pub fn append(&mut self, execution_id: &str, update: StreamUpdate) {
        let list = self
            .entries
            .entry(execution_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(16)));
        list.push_back(update);
        while list.len() > self.capacity {
            list.pop_front();
        }
    }

    /// Retained updates in chronological order. Empty if absent.
    pub fn get(&self, execution_id: &str) -> Vec<StreamUpdate> {
        self.entries
            .get(execution_id)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, execution_id: &str) -> usize {
        self.entries.get(execution_id).map_or(0, VecDeque::len)
    }

    pub fn contains(&self, execution_id: &str) -> bool {
        self.entries.contains_key(execution_id)
    }

    /// Drop the list for an id entirely.
    pub fn clear(&mut self, execution_id: &str) {
        self.entries.remove(execution_id);
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}
