//! In-process event bus for single-process operation.

use async_trait::async_trait;
use futures::stream;
use tokio::sync::broadcast;
use tracing::warn;

use super::{EventBus, EventError, EventStream, ProgressEvent};

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast channel shared by every task. Subscribers that fall behind
/// lose the oldest events.
#[derive(Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<ProgressEvent>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), EventError> {
        // Err only means nobody is listening.
        let _ = self.sender.send(event.clone());
        Ok(())
    }

    async fn subscribe_all(&self) -> Result<EventStream, EventError> {
        let receiver = self.sender.subscribe();
        let events = stream::unfold(receiver, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event subscriber lagged, dropped {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use futures::StreamExt;
    use serde_json::json;

    fn event(task_id: &str, kind: EventKind) -> ProgressEvent {
        ProgressEvent::new(task_id, "a.pdf", Some("b-1".into()), kind, json!({}))
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryEventBus::new();
        bus.publish(&event("t-1", EventKind::Started)).await.unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_sees_all_tasks_in_order() {
        let bus = InMemoryEventBus::new();
        let mut events = bus.subscribe_all().await.unwrap();

        bus.publish(&event("t-1", EventKind::Started)).await.unwrap();
        bus.publish(&event("t-2", EventKind::Started)).await.unwrap();
        bus.publish(&event("t-1", EventKind::Completed)).await.unwrap();

        let seen: Vec<_> = events
            .by_ref()
            .take(3)
            .map(|e| (e.task_id, e.event))
            .collect()
            .await;
        assert_eq!(
            seen,
            vec![
                ("t-1".to_string(), EventKind::Started),
                ("t-2".to_string(), EventKind::Started),
                ("t-1".to_string(), EventKind::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = InMemoryEventBus::new();
        bus.publish(&event("t-1", EventKind::Started)).await.unwrap();

        let mut events = bus.subscribe_all().await.unwrap();
        bus.publish(&event("t-1", EventKind::Error)).await.unwrap();
        assert_eq!(events.next().await.unwrap().event, EventKind::Error);
    }
}
