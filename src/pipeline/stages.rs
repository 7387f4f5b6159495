//! The three stage bodies. Each takes the job context and the previous
//! stage's output and returns its own output; terminal handling lives in
//! the orchestrator.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::orchestrator::{Orchestrator, Progress};
use super::prompts::structure_prompt;
use super::{
    pdf, ExtractionResult, FinalResult, JobContext, OcrOutput, SkippedPage, StageError,
};
use crate::capabilities::{Structurer, ValidationReview, Validator};
use crate::inference::{InferenceJob, InferenceResult};
use crate::region::{Classification, PageMode};

/// What the STRUCTURE stage produced.
pub(super) enum Structured {
    /// OCR found no text; the job ends here.
    NoText,
    Extracted(ExtractionResult),
}

impl Orchestrator {
    pub(super) async fn run_ocr(
        &self,
        ctx: &JobContext,
        progress: &Progress<'_>,
    ) -> Result<OcrOutput, StageError> {
        let task_dir = ctx.interim_dir(self.interim_root());
        let pages_dir = pdf::pages_dir(&task_dir, &ctx.source_path);

        progress
            .step(json!({"step": "extract_images", "message": "Extracting page images"}))
            .await;
        let pages = pdf::render_pages(&ctx.source_path, &pages_dir).await?;
        progress
            .step(json!({"step": "extract_images", "pages": pages.len(), "status": "done"}))
            .await;

        // Sequential so page order and separators stay deterministic.
        let mut jobs = Vec::new();
        let mut modes = Vec::new();
        let mut skipped = Vec::new();
        for (page_index, path) in pages.iter().enumerate() {
            match self.classifier().classify_path(path, ctx.template).await {
                Classification::Extract(decision) => {
                    modes.push(decision.mode);
                    jobs.push(InferenceJob {
                        page_index,
                        prompt: decision.mode.prompt().to_string(),
                        image: decision.image,
                    });
                }
                Classification::Skip(reason) => {
                    info!("[{}] page {} skipped: {}", ctx.task_id, page_index, reason);
                    skipped.push(SkippedPage {
                        page_index,
                        reason: reason.to_string(),
                    });
                }
            }
        }
        progress
            .step(json!({
                "step": "preprocessing",
                "prepared_pages": jobs.len(),
                "skipped_pages": skipped.len(),
            }))
            .await;

        progress
            .step(json!({"step": "ocr", "message": "Running batch OCR inference"}))
            .await;
        let report = self.executor().run_batch(jobs).await;
        progress
            .step(json!({
                "step": "ocr",
                "status": "done",
                "succeeded": report.succeeded,
                "failed": report.failed,
            }))
            .await;

        Ok(OcrOutput {
            text: join_pages(&modes, &report.results),
            skipped_pages: skipped,
            page_image_paths: pages,
        })
    }

    pub(super) async fn run_structure(
        &self,
        ctx: &JobContext,
        ocr: OcrOutput,
        progress: &Progress<'_>,
    ) -> Result<Structured, StageError> {
        if ocr.text.is_empty() {
            return Ok(Structured::NoText);
        }

        progress
            .step(json!({
                "step": "gpt_start",
                "message": format!("Initializing structured extraction ({} chars)", ocr.text.chars().count()),
            }))
            .await;
        progress
            .step(json!({"step": "extract_json", "message": "Extracting structured JSON from OCR results"}))
            .await;

        let prompt = structure_prompt(ctx.template.family());
        let reply = match self.structurer().structure(prompt, &ocr.text).await {
            Ok(reply) => {
                progress
                    .step(json!({"step": "extract_json", "status": "done"}))
                    .await;
                reply
            }
            Err(e) => {
                progress
                    .step(json!({"step": "extract_json", "status": "failed", "error": e.to_string()}))
                    .await;
                return Err(StageError::Structure(e));
            }
        };

        Ok(Structured::Extracted(ExtractionResult {
            task_id: ctx.task_id.clone(),
            filename: ctx.filename.clone(),
            batch_id: ctx.batch_id.clone(),
            template: ctx.template,
            processed_at: Utc::now(),
            result: parse_structured(&reply),
            raw_text: truncate_raw_text(&ocr.text, self.raw_text_limit()),
            skipped: ocr.skipped_pages,
            image_paths: ocr.page_image_paths,
        }))
    }

    pub(super) async fn run_validate(
        &self,
        ctx: &JobContext,
        mut extraction: ExtractionResult,
        progress: &Progress<'_>,
    ) -> Result<FinalResult, StageError> {
        progress
            .step(json!({"step": "validation", "message": "Validating extraction against document images"}))
            .await;

        let review = match self
            .validator()
            .validate(&extraction.image_paths, &extraction.result)
            .await
        {
            Ok(review) => review,
            Err(e) => {
                warn!("[{}] validation failed: {}", ctx.task_id, e);
                ValidationReview::error(e.to_string())
            }
        };

        self.remove_interim(ctx).await;
        extraction.image_paths.clear();

        Ok(FinalResult {
            extraction,
            validation_review: review,
        })
    }
}

/// Prefix each page's text with its mode separator and join with newlines.
/// `modes` and `results` are parallel, in page order.
pub fn join_pages(modes: &[PageMode], results: &[InferenceResult]) -> String {
    modes
        .iter()
        .zip(results)
        .map(|(mode, result)| format!("{}\n{}", mode.separator(), result.transcript()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the structuring reply as JSON, wrapping anything else as
/// `{"raw_response": reply}`. An empty reply yields `null`.
pub fn parse_structured(reply: &str) -> Value {
    if reply.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(reply).unwrap_or_else(|_| json!({ "raw_response": reply }))
}

/// Keep at most `limit` characters, marking a cut with a trailing `...`.
pub fn truncate_raw_text(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
