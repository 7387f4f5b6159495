//! Redis list-backed job queue for multi-process workers.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{JobQueue, QueueName, WorkQueueError};

/// Key prefix for queue lists in Redis.
const KEY_PREFIX: &str = "invoicepipe:queue:";
/// Polling interval while waiting for a message.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// LPUSH producers, RPOP consumers. Pops poll instead of BRPOP because the
/// connection manager multiplexes one connection across all workers.
#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
}

impl RedisJobQueue {
    pub async fn new(redis_url: &str) -> Result<Self, WorkQueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| WorkQueueError::Connection(format!("Redis connection error: {}", e)))?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            WorkQueueError::Connection(format!("Redis connection manager error: {}", e))
        })?;
        Ok(Self { conn })
    }

    fn key(queue: QueueName) -> String {
        format!("{}{}", KEY_PREFIX, queue.as_str())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, queue: QueueName, payload: String) -> Result<(), WorkQueueError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(Self::key(queue), payload)
            .await
            .map_err(|e| WorkQueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn pop(
        &self,
        queue: QueueName,
        timeout: Duration,
    ) -> Result<Option<String>, WorkQueueError> {
        let mut conn = self.conn.clone();
        let key = Self::key(queue);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let payload: Option<String> = conn
                .rpop(&key, None)
                .await
                .map_err(|e| WorkQueueError::Backend(e.to_string()))?;
            if payload.is_some() {
                return Ok(payload);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn len(&self, queue: QueueName) -> Result<u64, WorkQueueError> {
        let mut conn = self.conn.clone();
        let n: u64 = conn
            .llen(Self::key(queue))
            .await
            .map_err(|e| WorkQueueError::Backend(e.to_string()))?;
        Ok(n)
    }
}
