//! Progress event bus.
//!
//! Every document job publishes status messages on its own channel
//! (`task_updates:<task_id>`). Observers subscribe to all channels at once
//! with a wildcard. Delivery is fire-and-forget: nothing is stored and a
//! subscriber that connects late misses earlier events.

mod memory;

#[cfg(feature = "redis-backend")]
mod redis;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use memory::InMemoryEventBus;

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisEventBus;

/// Channel prefix; the full channel name is `task_updates:<task_id>`.
pub const CHANNEL_PREFIX: &str = "task_updates:";

/// Wildcard pattern matching every task channel.
pub const CHANNEL_PATTERN: &str = "task_updates:*";

pub fn channel_for(task_id: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, task_id)
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Event backend error: {0}")]
    Backend(String),
    #[error("Event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Progress,
    StepCompleted,
    Completed,
    Error,
    BatchCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Progress => "progress",
            Self::StepCompleted => "step_completed",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::BatchCompleted => "batch_completed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: String,
    pub filename: String,
    #[serde(default)]
    pub batch_id: Option<String>,
    pub event: EventKind,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        task_id: impl Into<String>,
        filename: impl Into<String>,
        batch_id: Option<String>,
        event: EventKind,
        data: Value,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            filename: filename.into(),
            batch_id,
            event,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn channel(&self) -> String {
        channel_for(&self.task_id)
    }

    pub fn to_json(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Stream of events from every task channel.
pub type EventStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish on the event's task channel. Having no subscribers is not an error.
    async fn publish(&self, event: &ProgressEvent) -> Result<(), EventError>;

    /// Subscribe to all task channels.
    async fn subscribe_all(&self) -> Result<EventStream, EventError>;
}

pub type BoxedEventBus = Arc<dyn EventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kind_wire_names() {
        let kinds = [
            (EventKind::Started, "started"),
            (EventKind::Progress, "progress"),
            (EventKind::StepCompleted, "step_completed"),
            (EventKind::Completed, "completed"),
            (EventKind::Error, "error"),
            (EventKind::BatchCompleted, "batch_completed"),
        ];
        for (kind, name) in kinds {
            assert_eq!(kind.as_str(), name);
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(name));
        }
    }

    #[test]
    fn test_event_payload_shape() {
        let event = ProgressEvent::new(
            "t-1",
            "scan.pdf",
            None,
            EventKind::Progress,
            json!({"step": "ocr", "status": "start"}),
        );
        assert_eq!(event.channel(), "task_updates:t-1");

        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "progress");
        assert_eq!(value["batch_id"], Value::Null);
        assert_eq!(value["data"]["step"], "ocr");
        assert!(value["timestamp"].is_string());

        let back = ProgressEvent::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(back, event);
    }
}
