//! Capability fakes driven by page pixels.
//!
//! Test pages are solid fills: the red channel names the document and the
//! green channel names the page kind. Crops keep the fill, so the fakes can
//! tell which page they are looking at.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use serde_json::{json, Value};

use invoicepipe::capabilities::{
    BarcodeDetector, BoxDetection, Capabilities, CapabilityError, Detection, LayoutDetector,
    QrDetector, Structurer, TextExtractor, ValidationReview, Validator,
};

/// Header, doc title, table and footer: a structured crop.
pub const STRUCTURED: u8 = 1;
/// No layout regions but a QR code: an identity-card crop.
pub const ID_CARD: u8 = 2;
/// Header and table with no title and no QR code: skipped.
pub const UNMATCHED: u8 = 3;

pub fn write_page(dir: &Path, name: &str, doc: u8, kind: u8) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(600, 1000, Rgb([doc, kind, 128]))
        .save(&path)
        .unwrap();
    path
}

fn marker(image: &RgbImage) -> (u8, u8) {
    let p = image.get_pixel(0, 0);
    (p[0], p[1])
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractCall {
    pub doc: u8,
    pub kind: u8,
    pub prompt: String,
    pub max_tokens: u32,
}

/// Layout, QR, barcode and transcription fake in one.
#[derive(Default)]
pub struct PageFake {
    /// Documents whose transcription fails.
    pub failing_docs: HashSet<u8>,
    /// Per-call delay in milliseconds, by page kind.
    pub delay_ms: Vec<(u8, u64)>,
    pub calls: Mutex<Vec<ExtractCall>>,
}

impl PageFake {
    pub fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities::new(self.clone(), self.clone(), self.clone(), self)
    }

    pub fn calls(&self) -> Vec<ExtractCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LayoutDetector for PageFake {
    async fn detect_layout(&self, image: &RgbImage) -> Result<Vec<Detection>, CapabilityError> {
        let (_, kind) = marker(image);
        Ok(match kind {
            STRUCTURED => vec![
                Detection::new("header", [0.0, 0.0, 600.0, 80.0], 0.9),
                Detection::new("doc_title", [100.0, 100.0, 500.0, 150.0], 0.9),
                Detection::new("table", [0.0, 200.0, 600.0, 800.0], 0.9),
                Detection::new("footer", [0.0, 900.0, 600.0, 950.0], 0.9),
            ],
            ID_CARD => Vec::new(),
            _ => vec![
                Detection::new("header", [0.0, 0.0, 600.0, 80.0], 0.9),
                Detection::new("table", [0.0, 200.0, 600.0, 800.0], 0.9),
            ],
        })
    }
}

#[async_trait]
impl QrDetector for PageFake {
    async fn detect_qr(&self, image: &RgbImage) -> Result<Vec<BoxDetection>, CapabilityError> {
        let (_, kind) = marker(image);
        Ok(if kind == ID_CARD {
            vec![BoxDetection::new([100.0, 600.0, 200.0, 700.0])]
        } else {
            Vec::new()
        })
    }
}

#[async_trait]
impl BarcodeDetector for PageFake {
    async fn detect_barcodes(
        &self,
        _image: &RgbImage,
    ) -> Result<Vec<BoxDetection>, CapabilityError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl TextExtractor for PageFake {
    async fn extract(
        &self,
        image: &RgbImage,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, CapabilityError> {
        let (doc, kind) = marker(image);
        self.calls.lock().unwrap().push(ExtractCall {
            doc,
            kind,
            prompt: prompt.to_string(),
            max_tokens,
        });
        if let Some((_, ms)) = self.delay_ms.iter().find(|(k, _)| *k == kind) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        if self.failing_docs.contains(&doc) {
            return Err(CapabilityError::Connection("refused".into()));
        }
        Ok(format!("doc {} kind {}", doc, kind))
    }
}

/// Returns `{"text": <input>}`, or fails when the text names a doc listed
/// in `failing_docs`.
#[derive(Default)]
pub struct EchoStructurer {
    pub failing_docs: HashSet<u8>,
}

#[async_trait]
impl Structurer for EchoStructurer {
    async fn structure(&self, _prompt: &str, text: &str) -> Result<String, CapabilityError> {
        if self
            .failing_docs
            .iter()
            .any(|d| text.contains(&format!("doc {} ", d)))
        {
            return Err(CapabilityError::Api {
                status: 500,
                message: "upstream failure".into(),
            });
        }
        Ok(json!({ "text": text }).to_string())
    }
}

/// Scores 100 when every image path still exists on disk.
#[derive(Default)]
pub struct FileCheckValidator {
    pub fail: bool,
}

#[async_trait]
impl Validator for FileCheckValidator {
    async fn validate(
        &self,
        image_paths: &[PathBuf],
        _content: &Value,
    ) -> Result<ValidationReview, CapabilityError> {
        if self.fail {
            return Err(CapabilityError::EmptyResponse);
        }
        let score = if !image_paths.is_empty() && image_paths.iter().all(|p| p.exists()) {
            100
        } else {
            0
        };
        Ok(ValidationReview::Review {
            mistakes: Vec::new(),
            score,
        })
    }
}
