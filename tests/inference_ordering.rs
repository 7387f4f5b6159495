//! Batch inference keeps input order regardless of completion order.

mod common;

use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};

use common::PageFake;
use invoicepipe::inference::{BatchInferenceExecutor, InferenceJob, InferenceOutcome};

fn job(page_index: usize, doc: u8, kind: u8) -> InferenceJob {
    InferenceJob {
        page_index,
        image: RgbImage::from_pixel(16, 16, Rgb([doc, kind, 0])),
        prompt: format!("page {}", page_index),
    }
}

#[tokio::test]
async fn test_results_follow_input_order() {
    // kind 1 pages are slow, kind 2 pages return almost immediately
    let fake = Arc::new(PageFake {
        delay_ms: vec![(1, 200), (2, 5)],
        ..Default::default()
    });
    let executor = BatchInferenceExecutor::new(fake.clone(), 4096);

    let report = executor
        .run_batch(vec![job(0, 1, 1), job(1, 2, 2), job(2, 3, 1), job(3, 4, 2)])
        .await;

    let indices: Vec<_> = report.results.iter().map(|r| r.page_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    let texts: Vec<_> = report.results.iter().map(|r| r.transcript()).collect();
    assert_eq!(
        texts,
        vec!["doc 1 kind 1", "doc 2 kind 2", "doc 3 kind 1", "doc 4 kind 2"]
    );
    // all four calls were in flight together
    assert!(report.elapsed < Duration::from_millis(390));
    assert_eq!(fake.calls().len(), 4);
}

#[tokio::test]
async fn test_failures_do_not_cancel_siblings() {
    let fake = Arc::new(PageFake {
        failing_docs: [2].into_iter().collect(),
        delay_ms: vec![(1, 50)],
        ..Default::default()
    });
    let executor = BatchInferenceExecutor::new(fake, 4096);

    let report = executor
        .run_batch(vec![job(0, 1, 1), job(1, 2, 2), job(2, 3, 1)])
        .await;

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(
        report.results[1].outcome,
        InferenceOutcome::Error("API Error: ConnectionError: Connection error: refused".into())
    );
    assert_eq!(report.results[2].transcript(), "doc 3 kind 1");
}
