//! Document submission: one job per accepted file, one batch per call.

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{info, warn};

use super::{pdf, JobContext, StageError, StageMessage, StagePayload};
use crate::backends::Backends;
use crate::batch::BatchCounter;
use crate::events::{EventBus, EventKind, ProgressEvent};
use crate::region::Template;
use crate::work_queue::enqueue_message;

#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// Set when more than one document was accepted.
    pub batch_id: Option<String>,
    pub jobs: Vec<JobContext>,
    /// Files that were not PDFs or images, or could not be resolved.
    pub rejected: Vec<PathBuf>,
}

/// Queue an OCR job for every supported file.
///
/// The batch counter is initialized before any job is queued so a fast job
/// can never decrement a counter that does not exist yet.
pub async fn submit_documents(
    backends: &Backends,
    files: &[PathBuf],
    template: Template,
) -> Result<Submission, StageError> {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for file in files {
        match resolve(file) {
            Some(path) => accepted.push(path),
            None => {
                warn!("Skipping unsupported or missing file {}", file.display());
                rejected.push(file.clone());
            }
        }
    }
    if accepted.is_empty() {
        return Err(StageError::NothingToSubmit);
    }

    let batch_id = (accepted.len() > 1).then(|| uuid::Uuid::new_v4().to_string());
    if let Some(id) = &batch_id {
        backends
            .counter
            .increment_batch(id, accepted.len() as u64)
            .await?;
        info!("Batch {} created with {} documents", id, accepted.len());
    }

    let total = accepted.len();
    let mut jobs = Vec::with_capacity(total);
    for path in accepted {
        let context = JobContext::new(path, template, batch_id.clone());
        let started = ProgressEvent::new(
            context.task_id.clone(),
            context.filename.clone(),
            context.batch_id.clone(),
            EventKind::Started,
            json!({"message": format!("Started processing {}", context.filename)}),
        );
        if let Err(e) = backends.events.publish(&started).await {
            warn!("[{}] failed to publish started event: {}", context.task_id, e);
        }

        let payload = StagePayload::Ocr;
        let queue = payload.queue();
        let message = StageMessage {
            context: context.clone(),
            payload,
        };
        if let Err(e) = enqueue_message(backends.queue.as_ref(), queue, &message).await {
            if let Some(id) = &batch_id {
                release_unqueued(backends, id, total - jobs.len()).await;
            }
            return Err(e.into());
        }
        info!("Queued {} as task {}", context.filename, context.task_id);
        jobs.push(context);
    }

    Ok(Submission {
        batch_id,
        jobs,
        rejected,
    })
}

/// Give back the batch slots of documents that never reached the queue, so
/// the queued ones can still complete the batch.
async fn release_unqueued(backends: &Backends, batch_id: &str, count: usize) {
    for _ in 0..count {
        if let Err(e) = backends.counter.decrement_and_check_zero(batch_id).await {
            warn!("Batch {} release failed: {}", batch_id, e);
            return;
        }
    }
}

fn resolve(file: &Path) -> Option<PathBuf> {
    if !pdf::is_supported(file) {
        return None;
    }
    std::fs::canonicalize(file).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventError, EventStream};
    use crate::work_queue::{InMemoryJobQueue, JobQueue, QueueName, WorkQueueError};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Event bus whose broker is unreachable.
    struct DownBus;

    #[async_trait]
    impl EventBus for DownBus {
        async fn publish(&self, _event: &ProgressEvent) -> Result<(), EventError> {
            Err(EventError::Backend("connection refused".into()))
        }

        async fn subscribe_all(&self) -> Result<EventStream, EventError> {
            Err(EventError::Backend("connection refused".into()))
        }
    }

    /// Accepts `capacity` pushes, then fails.
    struct ShortQueue {
        inner: InMemoryJobQueue,
        capacity: AtomicUsize,
    }

    #[async_trait]
    impl JobQueue for ShortQueue {
        async fn push(&self, queue: QueueName, payload: String) -> Result<(), WorkQueueError> {
            let left = self.capacity.load(Ordering::SeqCst);
            if left == 0 {
                return Err(WorkQueueError::Backend("queue full".into()));
            }
            self.capacity.store(left - 1, Ordering::SeqCst);
            self.inner.push(queue, payload).await
        }

        async fn pop(
            &self,
            queue: QueueName,
            timeout: Duration,
        ) -> Result<Option<String>, WorkQueueError> {
            self.inner.pop(queue, timeout).await
        }

        async fn len(&self, queue: QueueName) -> Result<u64, WorkQueueError> {
            self.inner.len(queue).await
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        path
    }

    #[tokio::test]
    async fn test_multi_file_submission_creates_batch() {
        let temp = TempDir::new().unwrap();
        let files = vec![
            touch(temp.path(), "a.pdf"),
            touch(temp.path(), "b.pdf"),
            touch(temp.path(), "notes.txt"),
        ];
        let backends = Backends::in_memory();
        let mut events = backends.events.subscribe_all().await.unwrap();

        let submission = submit_documents(&backends, &files, Template::Janzour)
            .await
            .unwrap();

        let batch_id = submission.batch_id.clone().unwrap();
        assert_eq!(submission.jobs.len(), 2);
        assert_eq!(submission.rejected, vec![files[2].clone()]);
        assert_eq!(backends.counter.pending(&batch_id).await.unwrap(), Some(2));
        assert_eq!(backends.queue.len(QueueName::Gpu).await.unwrap(), 2);

        let first = events.next().await.unwrap();
        assert_eq!(first.event, EventKind::Started);
        assert_eq!(first.batch_id.as_deref(), Some(batch_id.as_str()));

        let payload = backends
            .queue
            .pop(QueueName::Gpu, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        let message: StageMessage = serde_json::from_str(&payload).unwrap();
        assert_eq!(message.payload, StagePayload::Ocr);
        assert_eq!(message.context.template, Template::Janzour);
    }

    #[tokio::test]
    async fn test_single_file_has_no_batch() {
        let temp = TempDir::new().unwrap();
        let files = vec![touch(temp.path(), "only.pdf")];
        let backends = Backends::in_memory();

        let submission = submit_documents(&backends, &files, Template::Massara)
            .await
            .unwrap();
        assert!(submission.batch_id.is_none());
        assert!(submission.jobs[0].batch_id.is_none());
    }

    #[tokio::test]
    async fn test_nothing_to_submit() {
        let backends = Backends::in_memory();
        let err = submit_documents(&backends, &[PathBuf::from("/missing.pdf")], Template::Safwa)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::NothingToSubmit));
    }

    #[tokio::test]
    async fn test_event_bus_outage_does_not_block_submission() {
        let temp = TempDir::new().unwrap();
        let files = vec![touch(temp.path(), "a.pdf"), touch(temp.path(), "b.pdf")];
        let backends = Backends {
            events: Arc::new(DownBus),
            ..Backends::in_memory()
        };

        let submission = submit_documents(&backends, &files, Template::Janzour)
            .await
            .unwrap();

        let batch_id = submission.batch_id.unwrap();
        assert_eq!(backends.queue.len(QueueName::Gpu).await.unwrap(), 2);
        assert_eq!(backends.counter.pending(&batch_id).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_enqueue_failure_releases_unqueued_slots() {
        let temp = TempDir::new().unwrap();
        let files = vec![
            touch(temp.path(), "a.pdf"),
            touch(temp.path(), "b.pdf"),
            touch(temp.path(), "c.pdf"),
        ];
        let mut backends = Backends::in_memory();
        let mut events = backends.events.subscribe_all().await.unwrap();
        backends.queue = Arc::new(ShortQueue {
            inner: InMemoryJobQueue::new(),
            capacity: AtomicUsize::new(1),
        });

        let err = submit_documents(&backends, &files, Template::Janzour)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Queue(_)));
        assert_eq!(backends.queue.len(QueueName::Gpu).await.unwrap(), 1);

        let batch_id = events.next().await.unwrap().batch_id.unwrap();
        // only the queued job is still owed
        assert_eq!(backends.counter.pending(&batch_id).await.unwrap(), Some(1));
        assert!(backends
            .counter
            .decrement_and_check_zero(&batch_id)
            .await
            .unwrap());
    }
}
