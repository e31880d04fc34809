//! Subscriber connections and the registry that tracks them.
//!
//! A connection is registered against one execution id, or against the
//! wildcard [`DEFAULT_EXECUTION_ID`](crate::types::DEFAULT_EXECUTION_ID)
//! to receive every update. The same connection may be registered under
//! several ids; fan-out delivers to it once per update.
//!
//! # Example
//!
//! ```ignore
//! let store = Store::new(StoreConfig::default());
//! let handle = store.subscribe_with_replay("exec-1", 256);
//!
//! while let Ok(update) = handle.recv() {
//!     println!("{}: {}", update.stage, update.message);
//!     if update.is_terminal() {
//!         break;
//!     }
//! }
//! store.unsubscribe("exec-1", handle.id);
//! ```

mod registry;
mod types;

pub use registry::ConnectionRegistry;
pub use types::{ChannelConnection, Connection, ConnectionHandle, ConnectionId, WriterConnection};
