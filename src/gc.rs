//! Garbage collection of stale and finished executions.
//!
//! Three independent rules, any of which evicts an execution:
//! - completed, and completed longer ago than `completed_ttl`
//! - not completed, and not accessed for longer than `active_ttl`
//! - no subscribers, and no update for longer than `completed_ttl`
//!
//! Eviction drops the registry, history, and metadata entries together.

use crate::error::Result;
use crate::store::Tables;
use crate::types::ExecutionMetadata;
use crossbeam_channel::{bounded, select, tick, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Options for execution garbage collection.
#[derive(Clone, Debug)]
pub struct GcConfig {
    /// Time between periodic passes.
    /// Default: 5 minutes
    pub interval: Duration,

    /// Retention for completed and orphaned executions.
    /// Default: 1 hour
    pub completed_ttl: Duration,

    /// Retention for executions that never completed.
    /// Default: 24 hours
    pub active_ttl: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            completed_ttl: Duration::from_secs(60 * 60),
            active_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Why an execution was evicted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionReason {
    CompletedExpired,
    ActiveExpired,
    Orphaned,
}

/// Result of one GC pass.
#[derive(Clone, Debug, Default)]
pub struct GcResult {
    /// Executions that were evicted, sorted by id.
    pub evicted: Vec<(String, EvictionReason)>,
}

impl GcResult {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty()
    }

    pub fn evicted_ids(&self) -> Vec<&str> {
        self.evicted.iter().map(|(id, _)| id.as_str()).collect()
    }
}

/// Applies the retention rules to the store's tables.
#[derive(Clone, Debug, Default)]
pub struct GarbageCollector {
    config: GcConfig,
}

impl GarbageCollector {
    pub fn new(config: GcConfig) -> Self {
        Self { config }
    }

    /// First rule that matches, if any.
    pub fn evaluate(
        &self,
        meta: &ExecutionMetadata,
        has_subscribers: bool,
        now: Instant,
    ) -> Option<EvictionReason> {
        let age = |since: Instant| now.saturating_duration_since(since);

        if let Some(completed_at) = meta.completed_at.filter(|_| meta.is_completed) {
            if age(completed_at) > self.config.completed_ttl {
                return Some(EvictionReason::CompletedExpired);
            }
        }
        if !meta.is_completed && age(meta.last_access_time) > self.config.active_ttl {
            return Some(EvictionReason::ActiveExpired);
        }
        if !has_subscribers && age(meta.last_update_time) > self.config.completed_ttl {
            return Some(EvictionReason::Orphaned);
        }
        None
    }

    /// One full pass. The caller holds the tables lock for its duration.
    pub(crate) fn collect(&self, tables: &mut Tables, now: Instant) -> GcResult {
        let mut evicted: Vec<(String, EvictionReason)> = tables
            .metadata
            .iter()
            .filter_map(|(id, meta)| {
                self.evaluate(meta, tables.registry.has_subscribers(id), now)
                    .map(|reason| (id.clone(), reason))
            })
            .collect();
        evicted.sort_by(|a, b| a.0.cmp(&b.0));

        for (id, reason) in &evicted {
            tables.evict(id);
            info!(execution_id = %id, reason = ?reason, "evicted execution");
        }

        GcResult { evicted }
    }
}

/// Background thread that runs a callback on a fixed interval.
pub(crate) struct CleanupWorker {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl CleanupWorker {
    pub(crate) fn spawn<F>(interval: Duration, pass: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (stop, stop_rx) = bounded::<()>(1);
        let interval = interval.max(Duration::from_millis(1));

        let thread = thread::Builder::new()
            .name("execution-stream-gc".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => pass(),
                    }
                }
            })?;

        info!(interval = ?interval, "started periodic cleanup");
        Ok(Self { stop, thread })
    }

    /// Signal the thread and wait for any in-flight pass to finish.
    pub(crate) fn stop(self) {
        drop(self.stop);
        if self.thread.join().is_err() {
            warn!("cleanup worker panicked");
        }
        info!("stopped periodic cleanup");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::ChannelConnection;
    use crate::types::UpdateStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn meta(now: Instant) -> ExecutionMetadata {
        ExecutionMetadata::new(now)
    }

    #[test]
    fn test_completed_rule() {
        let gc = GarbageCollector::default();
        let t0 = Instant::now();
        let mut m = meta(t0);
        m.is_completed = true;
        m.completed_at = Some(t0);

        assert_eq!(gc.evaluate(&m, true, t0 + HOUR), None);
        assert_eq!(
            gc.evaluate(&m, true, t0 + HOUR + Duration::from_secs(1)),
            Some(EvictionReason::CompletedExpired)
        );
    }

    #[test]
    fn test_active_rule() {
        let gc = GarbageCollector::default();
        let t0 = Instant::now();
        let m = meta(t0);

        assert_eq!(gc.evaluate(&m, true, t0 + 23 * HOUR), None);
        assert_eq!(
            gc.evaluate(&m, true, t0 + 24 * HOUR + Duration::from_secs(1)),
            Some(EvictionReason::ActiveExpired)
        );
    }

    #[test]
    fn test_orphan_rule() {
        let gc = GarbageCollector::default();
        let t0 = Instant::now();
        let mut m = meta(t0);
        let later = t0 + HOUR + Duration::from_secs(1);
        m.last_access_time = later;

        assert_eq!(gc.evaluate(&m, false, later), Some(EvictionReason::Orphaned));
        assert_eq!(gc.evaluate(&m, true, later), None);
    }

    #[test]
    fn test_collect_evicts_all_tables_once() {
        let gc = GarbageCollector::default();
        let mut tables = Tables::new(10);
        let t0 = Instant::now();
        let (conn, _handle) = ChannelConnection::channel(4);

        tables.registry.add("done", Arc::new(conn));
        tables.metadata.touch("done", t0);
        tables.history.append(
            "done",
            crate::types::StreamUpdate::new("done", "s", UpdateStatus::Completed, "m", "t"),
        );
        tables.metadata.on_update("done", UpdateStatus::Completed, t0);
        tables.metadata.touch("fresh", t0 + 2 * HOUR);

        let now = t0 + 2 * HOUR;
        let result = gc.collect(&mut tables, now);
        assert_eq!(result.evicted_ids(), vec!["done"]);
        assert!(!tables.registry.has_subscribers("done"));
        assert!(!tables.history.contains("done"));
        assert!(tables.metadata.get("done").is_none());
        assert!(tables.metadata.get("fresh").is_some());

        assert!(gc.collect(&mut tables, now).is_empty());
    }

    #[test]
    fn test_worker_runs_and_stops() {
        let passes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&passes);
        let worker = CleanupWorker::spawn(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while passes.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        worker.stop();

        let after_stop = passes.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(passes.load(Ordering::SeqCst), after_stop);
    }
}
