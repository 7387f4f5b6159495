//! Work queue abstraction for stage messages.
//!
//! Stage messages travel as JSON through one of two named queues: `gpu`
//! for page classification work that must stay close to serialized, and
//! `llm` for I/O-bound language model calls. Backends only move opaque
//! payloads; typing happens at the edges (`enqueue_message` and the
//! `WorkerPool`).

mod error;
mod memory;
pub mod runner;

#[cfg(feature = "redis-backend")]
mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::WorkQueueError;
pub use memory::InMemoryJobQueue;
pub use runner::{MessageHandler, WorkerPool};

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisJobQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Gpu,
    Llm,
}

impl QueueName {
    pub const ALL: [QueueName; 2] = [QueueName::Gpu, QueueName::Llm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpu => "gpu",
            Self::Llm => "llm",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Some(Self::Gpu),
            "llm" => Some(Self::Llm),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A FIFO queue per `QueueName`, shared by producers and workers.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, queue: QueueName, payload: String) -> Result<(), WorkQueueError>;

    /// Take the oldest message, waiting up to `timeout` for one to arrive.
    async fn pop(
        &self,
        queue: QueueName,
        timeout: Duration,
    ) -> Result<Option<String>, WorkQueueError>;

    /// Number of messages waiting.
    async fn len(&self, queue: QueueName) -> Result<u64, WorkQueueError>;
}

pub type BoxedJobQueue = Arc<dyn JobQueue>;

/// Serialize and push one message.
pub async fn enqueue_message<T: Serialize + ?Sized>(
    queue: &dyn JobQueue,
    name: QueueName,
    message: &T,
) -> Result<(), WorkQueueError> {
    let payload = serde_json::to_string(message)?;
    queue.push(name, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_names() {
        assert_eq!(QueueName::from_str("GPU"), Some(QueueName::Gpu));
        assert_eq!(QueueName::from_str("llm"), Some(QueueName::Llm));
        assert_eq!(QueueName::from_str("cpu"), None);
        assert_eq!(QueueName::Llm.to_string(), "llm");
    }
}
