//! Redis-backed batch counter shared by every worker process.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::{BatchCounter, BatchError};

/// Key prefix for batch counters in Redis.
const KEY_PREFIX: &str = "invoicepipe:batch:";
/// Counters for abandoned batches expire on their own.
const BATCH_TTL_SECS: i64 = 7 * 86400;

/// Returns -1 for a missing key, otherwise the decremented value; the key is
/// deleted once it reaches zero.
const DECREMENT_SCRIPT: &str = r#"
    local key = KEYS[1]
    if redis.call('EXISTS', key) == 0 then
        return -1
    end
    local remaining = redis.call('DECR', key)
    if remaining <= 0 then
        redis.call('DEL', key)
        return 0
    end
    return remaining
"#;

#[derive(Clone)]
pub struct RedisBatchCounter {
    conn: ConnectionManager,
}

impl RedisBatchCounter {
    pub async fn new(redis_url: &str) -> Result<Self, BatchError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BatchError::Backend(format!("Redis connection error: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| BatchError::Backend(format!("Redis connection manager error: {}", e)))?;
        Ok(Self { conn })
    }

    fn key(&self, batch_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, batch_id)
    }
}

#[async_trait]
impl BatchCounter for RedisBatchCounter {
    async fn increment_batch(&self, batch_id: &str, count: u64) -> Result<(), BatchError> {
        let mut conn = self.conn.clone();
        let key = self.key(batch_id);
        redis::pipe()
            .atomic()
            .incr(&key, count as i64)
            .expire(&key, BATCH_TTL_SECS)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BatchError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn decrement_and_check_zero(&self, batch_id: &str) -> Result<bool, BatchError> {
        let mut conn = self.conn.clone();
        let remaining: i64 = Script::new(DECREMENT_SCRIPT)
            .key(self.key(batch_id))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| BatchError::Backend(e.to_string()))?;
        Ok(remaining == 0)
    }

    async fn pending(&self, batch_id: &str) -> Result<Option<u64>, BatchError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn
            .get(self.key(batch_id))
            .await
            .map_err(|e| BatchError::Backend(e.to_string()))?;
        Ok(value.map(|n| n.max(0) as u64))
    }
}
