//! Batch completion counters.
//!
//! A batch groups documents submitted together. Its counter starts at the
//! number of accepted documents and every job decrements it exactly once at
//! its terminal point. The job that brings it to zero removes the counter
//! and announces batch completion.
//!
//! Backends:
//! - In-memory (single process, tests)
//! - Redis (distributed, atomic Lua decrement)

mod memory;

#[cfg(feature = "redis-backend")]
mod redis;

use std::sync::Arc;

use async_trait::async_trait;

pub use memory::InMemoryBatchCounter;

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisBatchCounter;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Batch backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait BatchCounter: Send + Sync {
    /// Add `count` pending documents to a batch, creating it if needed.
    async fn increment_batch(&self, batch_id: &str, count: u64) -> Result<(), BatchError>;

    /// Atomically decrement the counter; returns true for the decrement that
    /// reached zero (the counter is then removed). Unknown batches return
    /// false and are never created.
    async fn decrement_and_check_zero(&self, batch_id: &str) -> Result<bool, BatchError>;

    /// Current pending count, if the batch exists.
    async fn pending(&self, batch_id: &str) -> Result<Option<u64>, BatchError>;
}

pub type BoxedBatchCounter = Arc<dyn BatchCounter>;
