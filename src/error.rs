//! Error types for the execution stream.

use crate::connections::ConnectionId;
use thiserror::Error;

/// Main error type for stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection closed: {0}")]
    Disconnected(ConnectionId),

    #[error("Connection buffer full: {0}")]
    BufferFull(ConnectionId),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        StreamError::Serialization(e.to_string())
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
