//! Redis pub/sub event bus for multi-process deployments.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use super::{EventBus, EventError, EventStream, ProgressEvent, CHANNEL_PATTERN};

/// Publishes each event on `task_updates:<task_id>`; subscribers use
/// `PSUBSCRIBE task_updates:*`.
#[derive(Clone)]
pub struct RedisEventBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisEventBus {
    pub async fn new(redis_url: &str) -> Result<Self, EventError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| EventError::Backend(format!("Redis connection error: {}", e)))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| EventError::Backend(format!("Redis connection manager error: {}", e)))?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), EventError> {
        let mut conn = self.conn.clone();
        let payload = event.to_json()?;
        conn.publish::<_, _, ()>(event.channel(), payload)
            .await
            .map_err(|e| EventError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn subscribe_all(&self) -> Result<EventStream, EventError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| EventError::Backend(e.to_string()))?;
        pubsub
            .psubscribe(CHANNEL_PATTERN)
            .await
            .map_err(|e| EventError::Backend(e.to_string()))?;

        let events = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!("Unreadable event payload: {}", e);
                    return None;
                }
            };
            match ProgressEvent::from_json(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Malformed event on {}: {}", msg.get_channel_name(), e);
                    None
                }
            }
        });
        Ok(Box::pin(events))
    }
}
