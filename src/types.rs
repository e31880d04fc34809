//! Core types for the execution stream.

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Max updates retained per execution.
pub const MAX_HISTORY: usize = 100;

/// Reserved execution id. Subscribers under it receive every update.
pub const DEFAULT_EXECUTION_ID: &str = "default";

/// Lifecycle status carried by an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    InProgress,
    Completed,
    Error,
    Info,
}

impl UpdateStatus {
    /// Whether this status ends an execution.
    pub fn is_terminal(self) -> bool {
        matches!(self, UpdateStatus::Completed | UpdateStatus::Error)
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateStatus::InProgress => "in_progress",
            UpdateStatus::Completed => "completed",
            UpdateStatus::Error => "error",
            UpdateStatus::Info => "info",
        };
        f.write_str(s)
    }
}

/// A single progress event published for an execution.
///
/// Immutable once published; the store clones it into history and into
/// every delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUpdate {
    /// Groups updates. Must be non-empty.
    pub execution_id: String,

    /// Producer-defined pipeline stage label.
    pub stage: String,

    pub status: UpdateStatus,

    /// Human-readable text.
    pub message: String,

    /// ISO-8601 timestamp supplied by the producer. Not used for ordering
    /// inside the store.
    pub timestamp: String,

    /// Opaque payload, passed through unexamined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

impl StreamUpdate {
    pub fn new(
        execution_id: impl Into<String>,
        stage: impl Into<String>,
        status: UpdateStatus,
        message: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            stage: stage.into(),
            status,
            message: message.into(),
            timestamp: timestamp.into(),
            data: None,
        }
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: serde_json::Map<String, serde_json::Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether this update completes its execution.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check the fields the store relies on.
    pub fn validate(&self) -> Result<()> {
        if self.execution_id.is_empty() {
            return Err(StreamError::InvalidUpdate(
                "executionId is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize as one JSON line, newline included.
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Lifecycle state tracked per execution id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionMetadata {
    /// Bumped on any read or write touching the execution.
    pub last_access_time: Instant,

    /// Bumped only on publish.
    pub last_update_time: Instant,

    pub is_completed: bool,

    /// Set once, on the transition to completed. `Some` iff `is_completed`.
    pub completed_at: Option<Instant>,
}

impl ExecutionMetadata {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            last_access_time: now,
            last_update_time: now,
            is_completed: false,
            completed_at: None,
        }
    }
}

/// Diagnostic snapshot of the store.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Subscribers across all execution ids, wildcard included.
    pub active_connections: usize,
    pub tracked_executions: usize,
    pub completed_executions: usize,
    pub active_executions: usize,
    /// Sorted.
    pub execution_ids: Vec<String>,
    /// Largest time since last access, `None` when nothing is tracked.
    pub oldest_execution_age: Option<Duration>,
}
