//! Work queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkQueueError {
    #[error("Queue backend error: {0}")]
    Backend(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Malformed queue message: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),
}
