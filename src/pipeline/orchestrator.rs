//! Stage chaining, terminal handling and batch accounting.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::stages::Structured;
use super::{JobContext, JobStage, StageError, StageMessage, StagePayload};
use crate::backends::Backends;
use crate::batch::{BatchCounter, BoxedBatchCounter};
use crate::capabilities::{Capabilities, Structurer, Validator};
use crate::config::Config;
use crate::events::{BoxedEventBus, EventBus, EventKind, ProgressEvent};
use crate::inference::BatchInferenceExecutor;
use crate::region::RegionClassifier;
use crate::work_queue::{enqueue_message, BoxedJobQueue, MessageHandler, QueueName};

/// Publishes events for one job. Publishing is best effort: a failure is
/// logged and never affects the job.
pub(super) struct Progress<'a> {
    events: &'a dyn EventBus,
    ctx: &'a JobContext,
}

impl<'a> Progress<'a> {
    fn new(events: &'a dyn EventBus, ctx: &'a JobContext) -> Self {
        Self { events, ctx }
    }

    pub(super) async fn emit(&self, kind: EventKind, data: Value) {
        let event = ProgressEvent::new(
            self.ctx.task_id.clone(),
            self.ctx.filename.clone(),
            self.ctx.batch_id.clone(),
            kind,
            data,
        );
        if let Err(e) = self.events.publish(&event).await {
            warn!("[{}] failed to publish {} event: {}", self.ctx.task_id, kind, e);
        }
    }

    pub(super) async fn step(&self, data: Value) {
        self.emit(EventKind::Progress, data).await;
    }
}

/// Runs the stage a message addresses and schedules the next one.
pub struct Orchestrator {
    classifier: RegionClassifier,
    executor: BatchInferenceExecutor,
    structurer: Arc<dyn Structurer>,
    validator: Arc<dyn Validator>,
    queue: BoxedJobQueue,
    counter: BoxedBatchCounter,
    events: BoxedEventBus,
    interim_root: PathBuf,
    raw_text_limit: usize,
}

impl Orchestrator {
    pub fn new(
        capabilities: Capabilities,
        structurer: Arc<dyn Structurer>,
        validator: Arc<dyn Validator>,
        backends: &Backends,
        config: &Config,
    ) -> Self {
        let executor = BatchInferenceExecutor::new(
            capabilities.extractor.clone(),
            config.llm.extract_max_tokens,
        );
        Self {
            classifier: RegionClassifier::new(capabilities, config.region.clone()),
            executor,
            structurer,
            validator,
            queue: backends.queue.clone(),
            counter: backends.counter.clone(),
            events: backends.events.clone(),
            interim_root: config.pipeline.interim_dir(),
            raw_text_limit: config.pipeline.raw_text_limit,
        }
    }

    pub(super) fn classifier(&self) -> &RegionClassifier {
        &self.classifier
    }

    pub(super) fn executor(&self) -> &BatchInferenceExecutor {
        &self.executor
    }

    pub(super) fn structurer(&self) -> &dyn Structurer {
        self.structurer.as_ref()
    }

    pub(super) fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }

    pub(super) fn interim_root(&self) -> &Path {
        &self.interim_root
    }

    pub(super) fn raw_text_limit(&self) -> usize {
        self.raw_text_limit
    }

    /// Run one stage message to its conclusion: either the next stage is
    /// queued or the job reaches a terminal point.
    pub async fn process(&self, message: StageMessage) {
        let StageMessage { context, payload } = message;
        let progress = Progress::new(self.events.as_ref(), &context);
        let stage = payload.stage();
        info!("[{}] {} stage for {}", context.task_id, stage, context.filename);

        let outcome = match payload {
            StagePayload::Ocr => match self.run_ocr(&context, &progress).await {
                Ok(ocr) => self.forward(&context, StagePayload::Structure(ocr)).await,
                Err(e) => Err(e),
            },
            StagePayload::Structure(ocr) => {
                match self.run_structure(&context, ocr, &progress).await {
                    Ok(Structured::NoText) => {
                        progress
                            .emit(
                                EventKind::Completed,
                                json!({"result": {}, "message": "No text detected in OCR"}),
                            )
                            .await;
                        self.finish(&context, &progress).await;
                        Ok(())
                    }
                    Ok(Structured::Extracted(extraction)) => {
                        progress
                            .emit(
                                EventKind::StepCompleted,
                                json!({"step": "extraction", "message": "Structured extraction complete"}),
                            )
                            .await;
                        self.forward(&context, StagePayload::Validate(extraction))
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            StagePayload::Validate(extraction) => {
                match self.run_validate(&context, extraction, &progress).await {
                    Ok(final_result) => match serde_json::to_value(&final_result) {
                        Ok(data) => {
                            progress.emit(EventKind::Completed, data).await;
                            self.finish(&context, &progress).await;
                            Ok(())
                        }
                        Err(e) => Err(StageError::Serialization(e)),
                    },
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(e) = outcome {
            self.fail(&context, stage, e, &progress).await;
        }
    }

    async fn forward(&self, ctx: &JobContext, payload: StagePayload) -> Result<(), StageError> {
        let queue = payload.queue();
        let next = payload.stage();
        let message = StageMessage {
            context: ctx.clone(),
            payload,
        };
        enqueue_message(self.queue.as_ref(), queue, &message).await?;
        debug!("[{}] queued {} on {}", ctx.task_id, next, queue);
        Ok(())
    }

    async fn fail(
        &self,
        ctx: &JobContext,
        stage: JobStage,
        err: StageError,
        progress: &Progress<'_>,
    ) {
        error!("[{}] {} stage failed: {}", ctx.task_id, stage, err);
        progress
            .emit(
                EventKind::Error,
                json!({
                    "stage": stage,
                    "message": format!("{} failed: {}", stage, err),
                }),
            )
            .await;
        self.remove_interim(ctx).await;
        self.settle_batch(ctx, progress).await;
    }

    async fn finish(&self, ctx: &JobContext, progress: &Progress<'_>) {
        info!("[{}] {} finished", ctx.task_id, JobStage::Done);
        self.remove_interim(ctx).await;
        self.settle_batch(ctx, progress).await;
    }

    /// The job's single batch decrement.
    async fn settle_batch(&self, ctx: &JobContext, progress: &Progress<'_>) {
        let Some(batch_id) = ctx.batch_id.as_deref() else {
            return;
        };
        match self.counter.decrement_and_check_zero(batch_id).await {
            Ok(true) => {
                info!("Batch {} completed", batch_id);
                progress
                    .emit(
                        EventKind::BatchCompleted,
                        json!({"message": "All documents in this batch have been processed."}),
                    )
                    .await;
            }
            Ok(false) => {}
            Err(e) => error!("[{}] batch {} decrement failed: {}", ctx.task_id, batch_id, e),
        }
    }

    /// Delete the task's scratch directory; missing is fine.
    pub(super) async fn remove_interim(&self, ctx: &JobContext) {
        let dir = ctx.interim_dir(&self.interim_root);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
        }
    }
}

#[async_trait]
impl MessageHandler for Orchestrator {
    type Message = StageMessage;

    async fn handle(&self, queue: QueueName, message: StageMessage) {
        let expected = message.payload.queue();
        if queue != expected {
            warn!(
                "[{}] {} message arrived on {} (expected {})",
                message.context.task_id,
                message.payload.stage(),
                queue,
                expected
            );
        }
        self.process(message).await;
    }
}
