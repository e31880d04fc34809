//! # Execution Stream
//!
//! An in-memory event bus for workflow execution updates. Producers publish
//! progress events tagged with an execution id; subscribers receive them
//! live, and late joiners replay a bounded history first.
//!
//! ## Core Concepts
//!
//! - **Updates**: Immutable progress events grouped by execution id
//! - **Connections**: Subscriber handles, per execution or on the `"default"` wildcard
//! - **History**: The most recent updates per execution, oldest dropped first
//! - **Cleanup**: TTL-based eviction of finished, stale, and orphaned executions
//!
//! ## Example
//!
//! ```ignore
//! use execution_stream::{Store, StoreConfig, StreamUpdate, UpdateStatus};
//!
//! let store = Store::new(StoreConfig::default());
//! store.start_periodic_cleanup()?;
//!
//! // Replay what happened so far, then stream live
//! let handle = store.subscribe_with_replay("exec-42", 256);
//!
//! store.publish(StreamUpdate::new(
//!     "exec-42",
//!     "fetch",
//!     UpdateStatus::InProgress,
//!     "Fetching sources",
//!     "2024-05-01T12:00:00Z",
//! ));
//!
//! let update = handle.recv()?;
//! store.unsubscribe("exec-42", handle.id);
//! store.shutdown();
//! ```

pub mod broadcast;
pub mod clock;
pub mod connections;
pub mod error;
pub mod gc;
pub mod history;
pub mod metadata;
pub mod store;
pub mod types;

// Re-exports
pub use broadcast::PublishReport;
pub use clock::{Clock, ManualClock, SystemClock};
pub use connections::{
    ChannelConnection, Connection, ConnectionHandle, ConnectionId, ConnectionRegistry,
    WriterConnection,
};
pub use error::{Result, StreamError};
pub use gc::{EvictionReason, GarbageCollector, GcConfig, GcResult};
pub use history::HistoryBuffer;
pub use metadata::ExecutionMetadataTable;
pub use store::{Store, StoreConfig};
pub use types::*;
