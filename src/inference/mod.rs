//! Batch inference executor.
//!
//! Every page of a document is transcribed concurrently on the calling task.
//! Output order always follows input order, and a failed call becomes an
//! error entry without cancelling its siblings. No retries happen here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::capabilities::{CapabilityError, TextExtractor};

/// One page submitted for transcription.
#[derive(Debug, Clone)]
pub struct InferenceJob {
    pub page_index: usize,
    pub image: RgbImage,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceOutcome {
    Text(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub page_index: usize,
    pub outcome: InferenceOutcome,
}

impl InferenceResult {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, InferenceOutcome::Error(_))
    }

    /// Text placed in the joined transcript; failures contribute their message.
    pub fn transcript(&self) -> &str {
        match &self.outcome {
            InferenceOutcome::Text(t) => t,
            InferenceOutcome::Error(e) => e,
        }
    }
}

/// Stringified per-item failure: `API Error: <kind>: <message>`.
pub fn describe_error(e: &CapabilityError) -> String {
    format!("API Error: {}: {}", e.kind(), e)
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<InferenceResult>,
    pub elapsed: Duration,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct BatchInferenceExecutor {
    extractor: Arc<dyn TextExtractor>,
    max_tokens: u32,
}

impl BatchInferenceExecutor {
    pub fn new(extractor: Arc<dyn TextExtractor>, max_tokens: u32) -> Self {
        Self {
            extractor,
            max_tokens,
        }
    }

    pub async fn run_batch(&self, jobs: Vec<InferenceJob>) -> BatchReport {
        let start = Instant::now();
        let total = jobs.len();

        let calls = jobs.into_iter().map(|job| async move {
            let outcome = match self
                .extractor
                .extract(&job.image, &job.prompt, self.max_tokens)
                .await
            {
                Ok(text) => InferenceOutcome::Text(text),
                Err(e) => InferenceOutcome::Error(describe_error(&e)),
            };
            InferenceResult {
                page_index: job.page_index,
                outcome,
            }
        });
        let results = join_all(calls).await;

        let elapsed = start.elapsed();
        let failed = results.iter().filter(|r| r.is_error()).count();
        let succeeded = total - failed;

        let per_page = if total > 0 {
            elapsed / total as u32
        } else {
            Duration::ZERO
        };
        info!(
            "Batch inference completed: {}/{} succeeded in {:.2}s ({:.2}s per page)",
            succeeded,
            total,
            elapsed.as_secs_f64(),
            per_page.as_secs_f64()
        );
        for r in results.iter().filter(|r| r.is_error()) {
            warn!("page {}: {}", r.page_index, r.transcript());
        }

        BatchReport {
            results,
            elapsed,
            succeeded,
            failed,
        }
    }
}
