//! Publishing: record an update, then fan it out to subscribers.

use crate::connections::{Connection, ConnectionId, ConnectionRegistry};
use crate::store::Tables;
use crate::types::{StreamUpdate, DEFAULT_EXECUTION_ID};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of one publish call. Never carries an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// False when the update was rejected and nothing was recorded.
    pub recorded: bool,
    /// Connections that accepted the update.
    pub delivered: usize,
    /// Connections whose send failed.
    pub failed: usize,
}

/// Applies published updates to the store's tables.
pub(crate) struct BroadcastEngine;

impl BroadcastEngine {
    /// Append to history, update metadata, then deliver to the exact and
    /// wildcard subscribers.
    ///
    /// Runs with the tables locked, so history and delivery order match
    /// call order per execution.
    pub(crate) fn publish(tables: &mut Tables, update: StreamUpdate, now: Instant) -> PublishReport {
        if let Err(e) = update.validate() {
            warn!(error = %e, stage = %update.stage, "dropping update");
            return PublishReport::default();
        }

        let execution_id = update.execution_id.clone();
        tables.history.append(&execution_id, update.clone());
        tables.metadata.on_update(&execution_id, update.status, now);

        let targets = Self::resolve(&tables.registry, &execution_id);
        let (delivered, failed) = Self::deliver(&targets, &update);

        debug!(
            execution_id = %execution_id,
            status = %update.status,
            delivered,
            failed,
            "published update"
        );

        PublishReport {
            recorded: true,
            delivered,
            failed,
        }
    }

    /// Union of the id's subscribers and the wildcard subscribers, each
    /// connection once.
    pub(crate) fn resolve(
        registry: &ConnectionRegistry,
        execution_id: &str,
    ) -> Vec<Arc<dyn Connection>> {
        let mut seen: HashSet<ConnectionId> = HashSet::new();
        let mut targets = registry.get(execution_id);
        targets.retain(|conn| seen.insert(conn.id()));

        if execution_id != DEFAULT_EXECUTION_ID {
            for conn in registry.get(DEFAULT_EXECUTION_ID) {
                if seen.insert(conn.id()) {
                    targets.push(conn);
                }
            }
        }

        targets
    }

    /// Best-effort delivery. A failed connection is logged and skipped; its
    /// owner is expected to unsubscribe it.
    fn deliver(targets: &[Arc<dyn Connection>], update: &StreamUpdate) -> (usize, usize) {
        let mut delivered = 0;
        let mut failed = 0;

        for conn in targets {
            match conn.send(update) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        connection = %conn.id(),
                        execution_id = %update.execution_id,
                        error = %e,
                        "delivery failed"
                    );
                }
            }
        }

        (delivered, failed)
    }
}
