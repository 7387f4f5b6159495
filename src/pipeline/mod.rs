//! Document pipeline: OCR, then structuring, then validation.
//!
//! Each stage runs from a queue message that carries the job's immutable
//! context plus the previous stage's typed output, so consecutive stages can
//! run on different workers. The orchestrator turns every stage failure
//! into a terminal `error` event and performs the job's single batch
//! decrement.

pub mod maintenance;
mod orchestrator;
pub mod pdf;
pub mod prompts;
mod stages;
pub mod submit;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::capabilities::{CapabilityError, ValidationReview};
use crate::events::EventError;
use crate::region::Template;
use crate::work_queue::{QueueName, WorkQueueError};

pub use orchestrator::Orchestrator;
pub use stages::{join_pages, parse_structured, truncate_raw_text};
pub use submit::{submit_documents, Submission};

#[derive(Debug, Error)]
pub enum StageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported document: {0}")]
    Unsupported(String),
    #[error("Page rendering failed: {0}")]
    Render(String),
    #[error("Structuring call failed: {0}")]
    Structure(#[source] CapabilityError),
    #[error("Queue error: {0}")]
    Queue(#[from] WorkQueueError),
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Batch counter error: {0}")]
    Batch(#[from] crate::batch::BatchError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No supported documents to submit")]
    NothingToSubmit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStage {
    Ocr,
    Structure,
    Validate,
    Done,
    Error,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ocr => "OCR",
            Self::Structure => "STRUCTURE",
            Self::Validate => "VALIDATE",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable identity of one document job, threaded through every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobContext {
    pub task_id: String,
    pub filename: String,
    #[serde(default)]
    pub batch_id: Option<String>,
    pub template: Template,
    pub source_path: PathBuf,
}

impl JobContext {
    pub fn new(source_path: PathBuf, template: Template, batch_id: Option<String>) -> Self {
        let filename = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            filename,
            batch_id,
            template,
            source_path,
        }
    }

    /// Per-task scratch directory under the interim root.
    pub fn interim_dir(&self, interim_root: &Path) -> PathBuf {
        interim_root.join(&self.task_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPage {
    pub page_index: usize,
    pub reason: String,
}

/// OCR stage output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    pub skipped_pages: Vec<SkippedPage>,
    pub page_image_paths: Vec<PathBuf>,
}

/// STRUCTURE stage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub task_id: String,
    pub filename: String,
    pub batch_id: Option<String>,
    pub template: Template,
    pub processed_at: DateTime<Utc>,
    pub result: Value,
    pub raw_text: String,
    pub skipped: Vec<SkippedPage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_paths: Vec<PathBuf>,
}

/// VALIDATE stage output, carried by the terminal `completed` event.
/// `image_paths` is empty by then because the images are deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    #[serde(flatten)]
    pub extraction: ExtractionResult,
    pub validation_review: ValidationReview,
}

/// Input of the stage a message is addressed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "input", rename_all = "snake_case")]
pub enum StagePayload {
    Ocr,
    Structure(OcrOutput),
    Validate(ExtractionResult),
}

impl StagePayload {
    pub fn stage(&self) -> JobStage {
        match self {
            Self::Ocr => JobStage::Ocr,
            Self::Structure(_) => JobStage::Structure,
            Self::Validate(_) => JobStage::Validate,
        }
    }

    /// Page classification needs the GPU pool; the rest are LLM calls.
    pub fn queue(&self) -> QueueName {
        match self {
            Self::Ocr => QueueName::Gpu,
            Self::Structure(_) | Self::Validate(_) => QueueName::Llm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMessage {
    pub context: JobContext,
    pub payload: StagePayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_takes_filename_from_path() {
        let ctx = JobContext::new(PathBuf::from("/up/inv 1.pdf"), Template::Safwa, None);
        assert_eq!(ctx.filename, "inv 1.pdf");
        assert_eq!(ctx.task_id.len(), 36);
        assert_eq!(
            ctx.interim_dir(Path::new("/data/interim")),
            PathBuf::from("/data/interim").join(&ctx.task_id)
        );
    }

    #[test]
    fn test_stage_routing() {
        assert_eq!(StagePayload::Ocr.queue(), QueueName::Gpu);
        assert_eq!(
            StagePayload::Structure(OcrOutput::default()).queue(),
            QueueName::Llm
        );
        assert_eq!(StagePayload::Ocr.stage(), JobStage::Ocr);
    }

    #[test]
    fn test_stage_message_survives_the_queue() {
        let message = StageMessage {
            context: JobContext::new(PathBuf::from("a.pdf"), Template::Muasafat, Some("b".into())),
            payload: StagePayload::Structure(OcrOutput {
                text: "===========page===========\nبيانات".into(),
                skipped_pages: vec![SkippedPage {
                    page_index: 2,
                    reason: "no QR code on identity-card candidate".into(),
                }],
                page_image_paths: vec![PathBuf::from("/i/page-1.png")],
            }),
        };
        let wire = serde_json::to_string(&message).unwrap();
        let value: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(value["payload"]["stage"], "structure");
        assert_eq!(value["context"]["template"], "muasafat");

        let back: StageMessage = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_final_result_drops_image_paths() {
        let final_result = FinalResult {
            extraction: ExtractionResult {
                task_id: "t".into(),
                filename: "a.pdf".into(),
                batch_id: None,
                template: Template::Janzour,
                processed_at: Utc::now(),
                result: json!({"documents": []}),
                raw_text: "x".into(),
                skipped: Vec::new(),
                image_paths: Vec::new(),
            },
            validation_review: ValidationReview::error("down"),
        };
        let value = serde_json::to_value(&final_result).unwrap();
        assert!(value.get("image_paths").is_none());
        assert_eq!(value["validation_review"]["error"], "down");
        assert_eq!(value["result"]["documents"], json!([]));
    }
}
