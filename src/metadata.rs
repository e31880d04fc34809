//! Per-execution lifecycle state.

use crate::types::{ExecutionMetadata, UpdateStatus};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lifecycle table keyed by execution id.
#[derive(Default)]
pub struct ExecutionMetadataTable {
    entries: HashMap<String, ExecutionMetadata>,
}

impl ExecutionMetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entry if absent, otherwise bump its access time.
    pub fn touch(&mut self, execution_id: &str, now: Instant) {
        match self.entries.get_mut(execution_id) {
            Some(meta) => meta.last_access_time = now,
            None => {
                self.entries
                    .insert(execution_id.to_string(), ExecutionMetadata::new(now));
            }
        }
    }

    /// Bump access time only for an existing entry.
    pub fn mark_accessed(&mut self, execution_id: &str, now: Instant) {
        if let Some(meta) = self.entries.get_mut(execution_id) {
            meta.last_access_time = now;
        }
    }

    /// Record a published update.
    ///
    /// A terminal status completes the execution once; later terminal
    /// updates leave `completed_at` alone.
    pub fn on_update(&mut self, execution_id: &str, status: UpdateStatus, now: Instant) {
        let meta = self
            .entries
            .entry(execution_id.to_string())
            .or_insert_with(|| ExecutionMetadata::new(now));
        meta.last_access_time = now;
        meta.last_update_time = now;

        if status.is_terminal() && !meta.is_completed {
            meta.is_completed = true;
            meta.completed_at = Some(now);
        }
    }

    pub fn get(&self, execution_id: &str) -> Option<ExecutionMetadata> {
        self.entries.get(execution_id).copied()
    }

    pub fn remove(&mut self, execution_id: &str) {
        self.entries.remove(execution_id);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExecutionMetadata)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.entries.values().filter(|m| m.is_completed).count()
    }

    /// Largest time since last access, for diagnostics.
    pub fn oldest_age(&self, now: Instant) -> Option<Duration> {
        self.entries
            .values()
            .map(|m| now.saturating_duration_since(m.last_access_time))
            .max()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
