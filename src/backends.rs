//! Broker-backed services shared by submitters and workers.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::batch::{BatchError, BoxedBatchCounter, InMemoryBatchCounter};
use crate::config::BrokerConfig;
use crate::events::{BoxedEventBus, EventError, InMemoryEventBus};
use crate::work_queue::{BoxedJobQueue, InMemoryJobQueue, WorkQueueError};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Queue(#[from] WorkQueueError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Events(#[from] EventError),
    #[error("Broker {0} requires the redis-backend feature")]
    RedisDisabled(String),
}

/// Job queue, batch counter and event bus on one broker.
#[derive(Clone)]
pub struct Backends {
    pub queue: BoxedJobQueue,
    pub counter: BoxedBatchCounter,
    pub events: BoxedEventBus,
}

impl Backends {
    /// Single-process backends; nothing survives a restart.
    pub fn in_memory() -> Self {
        Self {
            queue: Arc::new(InMemoryJobQueue::new()),
            counter: Arc::new(InMemoryBatchCounter::new()),
            events: Arc::new(InMemoryEventBus::new()),
        }
    }

    pub async fn connect(config: &BrokerConfig) -> Result<Self, BackendError> {
        if config.is_memory() {
            debug!("Using in-memory queue, batch counter and event bus");
            return Ok(Self::in_memory());
        }
        Self::connect_redis(&config.url).await
    }

    #[cfg(feature = "redis-backend")]
    async fn connect_redis(url: &str) -> Result<Self, BackendError> {
        use crate::batch::RedisBatchCounter;
        use crate::events::RedisEventBus;
        use crate::work_queue::RedisJobQueue;

        debug!("Using Redis broker");
        Ok(Self {
            queue: Arc::new(RedisJobQueue::new(url).await?),
            counter: Arc::new(RedisBatchCounter::new(url).await?),
            events: Arc::new(RedisEventBus::new(url).await?),
        })
    }

    #[cfg(not(feature = "redis-backend"))]
    async fn connect_redis(url: &str) -> Result<Self, BackendError> {
        Err(BackendError::RedisDisabled(url.to_string()))
    }
}
