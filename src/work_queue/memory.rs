//! In-memory job queue for single-process operation.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{JobQueue, QueueName, WorkQueueError};

#[derive(Default)]
struct Lane {
    messages: Mutex<VecDeque<String>>,
    notify: Notify,
}

/// Messages are lost when the process exits.
#[derive(Default)]
pub struct InMemoryJobQueue {
    gpu: Lane,
    llm: Lane,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lane(&self, queue: QueueName) -> &Lane {
        match queue {
            QueueName::Gpu => &self.gpu,
            QueueName::Llm => &self.llm,
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn push(&self, queue: QueueName, payload: String) -> Result<(), WorkQueueError> {
        let lane = self.lane(queue);
        lane.messages.lock().await.push_back(payload);
        lane.notify.notify_one();
        Ok(())
    }

    async fn pop(
        &self,
        queue: QueueName,
        timeout: Duration,
    ) -> Result<Option<String>, WorkQueueError> {
        let lane = self.lane(queue);
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(payload) = lane.messages.lock().await.pop_front() {
                return Ok(Some(payload));
            }
            if tokio::time::timeout_at(deadline, lane.notify.notified())
                .await
                .is_err()
            {
                return Ok(lane.messages.lock().await.pop_front());
            }
        }
    }

    async fn len(&self, queue: QueueName) -> Result<u64, WorkQueueError> {
        Ok(self.lane(queue).messages.lock().await.len() as u64)
    }
}
