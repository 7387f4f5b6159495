//! In-memory batch counter.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BatchCounter, BatchError};

#[derive(Default)]
pub struct InMemoryBatchCounter {
    counters: Mutex<HashMap<String, i64>>,
}

impl InMemoryBatchCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchCounter for InMemoryBatchCounter {
    async fn increment_batch(&self, batch_id: &str, count: u64) -> Result<(), BatchError> {
        let mut counters = self.counters.lock().await;
        *counters.entry(batch_id.to_string()).or_insert(0) += count as i64;
        Ok(())
    }

    async fn decrement_and_check_zero(&self, batch_id: &str) -> Result<bool, BatchError> {
        let mut counters = self.counters.lock().await;
        let Some(pending) = counters.get_mut(batch_id) else {
            return Ok(false);
        };
        *pending -= 1;
        if *pending <= 0 {
            counters.remove(batch_id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn pending(&self, batch_id: &str) -> Result<Option<u64>, BatchError> {
        let counters = self.counters.lock().await;
        Ok(counters.get(batch_id).map(|n| (*n).max(0) as u64))
    }
}
