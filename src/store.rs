//! Main Store struct tying all components together.

use crate::broadcast::{BroadcastEngine, PublishReport};
use crate::clock::{Clock, SystemClock};
use crate::connections::{
    ChannelConnection, Connection, ConnectionHandle, ConnectionId, ConnectionRegistry,
};
use crate::error::Result;
use crate::gc::{CleanupWorker, GarbageCollector, GcConfig, GcResult};
use crate::history::HistoryBuffer;
use crate::metadata::ExecutionMetadataTable;
use crate::types::{
    ExecutionMetadata, StoreStats, StreamUpdate, DEFAULT_EXECUTION_ID, MAX_HISTORY,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Updates retained per execution.
    pub max_history: usize,

    /// Retention rules and cleanup interval.
    pub gc: GcConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_history: MAX_HISTORY,
            gc: GcConfig::default(),
        }
    }
}

/// The three per-execution tables, always locked together.
pub(crate) struct Tables {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) history: HistoryBuffer,
    pub(crate) metadata: ExecutionMetadataTable,
}

impl Tables {
    pub(crate) fn new(max_history: usize) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            history: HistoryBuffer::with_capacity(max_history),
            metadata: ExecutionMetadataTable::new(),
        }
    }

    /// Drop every entry for an id. Wildcard subscribers are not tied to an
    /// execution and stay registered.
    pub(crate) fn evict(&mut self, execution_id: &str) {
        if execution_id != DEFAULT_EXECUTION_ID {
            self.registry.remove_execution(execution_id);
        }
        self.history.clear(execution_id);
        self.metadata.remove(execution_id);
    }

    fn clear(&mut self) {
        self.registry.clear();
        self.history.clear_all();
        self.metadata.clear();
    }
}

/// State shared with the cleanup worker.
struct Shared {
    clock: Arc<dyn Clock>,
    gc: GarbageCollector,
    tables: Mutex<Tables>,
}

impl Shared {
    fn run_gc(&self) -> GcResult {
        let mut tables = self.tables.lock();
        let now = self.clock.now();
        self.gc.collect(&mut tables, now)
    }
}

/// The execution event bus.
///
/// Provides a unified interface for:
/// - Publishing updates and fanning them out to subscribers
/// - Registering exact and wildcard subscribers
/// - Replaying retained history to late joiners
/// - Evicting stale executions, on demand or on a timer
pub struct Store {
    config: StoreConfig,
    shared: Arc<Shared>,
    cleanup: Mutex<Option<CleanupWorker>>,
}

impl Store {
    /// Create a store on the system clock. Cleanup is not started.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a store reading time from `clock`.
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        let shared = Shared {
            clock,
            gc: GarbageCollector::new(config.gc.clone()),
            tables: Mutex::new(Tables::new(config.max_history)),
        };
        Self {
            config,
            shared: Arc::new(shared),
            cleanup: Mutex::new(None),
        }
    }

    // --- Producer ---

    /// Record an update and deliver it to the execution's subscribers and
    /// the wildcard subscribers. Delivery failures are absorbed.
    pub fn publish(&self, update: StreamUpdate) -> PublishReport {
        let mut tables = self.shared.tables.lock();
        let now = self.shared.clock.now();
        BroadcastEngine::publish(&mut tables, update, now)
    }

    // --- Consumer ---

    /// Register a connection for an execution id (or the wildcard id).
    /// An empty id is rejected, as in `publish`.
    pub fn subscribe(&self, execution_id: &str, conn: Arc<dyn Connection>) {
        let mut tables = self.shared.tables.lock();
        let now = self.shared.clock.now();
        Self::register(&mut tables, execution_id, conn, now);
    }

    /// Register a new channel connection and return its receiving side.
    pub fn subscribe_channel(&self, execution_id: &str, buffer_size: usize) -> ConnectionHandle {
        let (conn, handle) = ChannelConnection::channel(buffer_size);
        self.subscribe(execution_id, Arc::new(conn));
        handle
    }

    /// Like [`subscribe_channel`](Self::subscribe_channel), but the channel
    /// starts with the retained history queued.
    ///
    /// Replay and registration happen under one lock, so no update is
    /// missed or seen twice. The channel holds the history plus
    /// `buffer_size` live updates.
    pub fn subscribe_with_replay(&self, execution_id: &str, buffer_size: usize) -> ConnectionHandle {
        let mut tables = self.shared.tables.lock();
        let now = self.shared.clock.now();
        let history = tables.history.get(execution_id);

        let (conn, handle) = ChannelConnection::channel(history.len() + buffer_size.max(1));
        for update in &history {
            // Capacity covers the whole history.
            let _ = conn.send(update);
        }

        if Self::register(&mut tables, execution_id, Arc::new(conn), now) {
            debug!(execution_id = %execution_id, replayed = history.len(), "replayed history");
        }
        handle
    }

    fn register(
        tables: &mut Tables,
        execution_id: &str,
        conn: Arc<dyn Connection>,
        now: Instant,
    ) -> bool {
        if execution_id.is_empty() {
            warn!(connection = %conn.id(), "rejecting subscription without execution id");
            return false;
        }

        let conn_id = conn.id();
        tables.registry.add(execution_id, conn);
        if execution_id != DEFAULT_EXECUTION_ID {
            tables.metadata.touch(execution_id, now);
        }
        debug!(execution_id = %execution_id, connection = %conn_id, "subscribed");
        true
    }

    /// Unregister a connection. Unknown ids and handles are a no-op.
    pub fn unsubscribe(&self, execution_id: &str, conn_id: ConnectionId) -> bool {
        let removed = self.shared.tables.lock().registry.remove(execution_id, conn_id);
        if removed {
            debug!(execution_id = %execution_id, connection = %conn_id, "unsubscribed");
        }
        removed
    }

    /// Retained updates for an execution, oldest first.
    pub fn history(&self, execution_id: &str) -> Vec<StreamUpdate> {
        let mut tables = self.shared.tables.lock();
        let now = self.shared.clock.now();
        tables.metadata.mark_accessed(execution_id, now);
        tables.history.get(execution_id)
    }

    /// Drop the retained history, keeping subscribers and metadata.
    pub fn clear_history(&self, execution_id: &str) {
        self.shared.tables.lock().history.clear(execution_id);
    }

    /// Drop everything tracked for an execution.
    pub fn cleanup_execution(&self, execution_id: &str) {
        self.shared.tables.lock().evict(execution_id);
        debug!(execution_id = %execution_id, "cleaned up execution");
    }

    // --- Diagnostics ---

    pub fn metadata(&self, execution_id: &str) -> Option<ExecutionMetadata> {
        self.shared.tables.lock().metadata.get(execution_id)
    }

    /// Subscribers across all ids.
    pub fn connection_count(&self) -> usize {
        self.shared.tables.lock().registry.count()
    }

    pub fn stats(&self) -> StoreStats {
        let tables = self.shared.tables.lock();
        let now = self.shared.clock.now();

        let tracked = tables.metadata.len();
        let completed = tables.metadata.completed_count();
        let mut execution_ids: Vec<String> =
            tables.metadata.iter().map(|(id, _)| id.clone()).collect();
        execution_ids.sort();

        StoreStats {
            active_connections: tables.registry.count(),
            tracked_executions: tracked,
            completed_executions: completed,
            active_executions: tracked - completed,
            execution_ids,
            oldest_execution_age: tables.metadata.oldest_age(now),
        }
    }

    // --- Cleanup Lifecycle ---

    /// Run one GC pass now.
    pub fn run_gc(&self) -> GcResult {
        self.shared.run_gc()
    }

    /// Start the periodic GC thread. No-op if already running.
    pub fn start_periodic_cleanup(&self) -> Result<()> {
        let mut cleanup = self.cleanup.lock();
        if cleanup.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let worker = CleanupWorker::spawn(self.config.gc.interval, move || {
            shared.run_gc();
        })?;
        *cleanup = Some(worker);
        Ok(())
    }

    /// Stop the periodic GC thread. No-op if not running.
    pub fn stop_periodic_cleanup(&self) {
        let worker = self.cleanup.lock().take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup.lock().is_some()
    }

    /// Stop cleanup and drop all tracked state.
    pub fn shutdown(&self) {
        self.stop_periodic_cleanup();
        self.shared.tables.lock().clear();
        debug!("store shut down");
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(worker) = self.cleanup.get_mut().take() {
            worker.stop();
        }
    }
}
