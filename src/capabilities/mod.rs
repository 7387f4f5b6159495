//! Capability adapters consumed by the classifier, executor and pipeline.
//!
//! Detectors and language-model endpoints are external services. The core only
//! sees the traits below, so tests can substitute scripted fakes.

pub mod api_backend;
mod detection;
pub mod http_detector;
pub mod openai;

pub use detection::{BBox, BoxDetection, Detection, LayoutLabel, PixelBox};
pub use http_detector::HttpDetector;
pub use openai::{OpenAiClient, OpenAiExtractor, OpenAiStructurer, OpenAiValidator};

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from capability adapters.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Image error: {0}")]
    Image(String),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CapabilityError {
    /// Short class name used when a failure is recorded in place of text.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "ConnectionError",
            Self::Api { .. } => "APIError",
            Self::Parse(_) => "ParseError",
            Self::RateLimited { .. } => "RateLimitError",
            Self::Image(_) => "ImageError",
            Self::EmptyResponse => "EmptyResponse",
            Self::NotConfigured(_) => "NotConfigured",
            Self::Io(_) => "IoError",
        }
    }
}

impl From<image::ImageError> for CapabilityError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e.to_string())
    }
}

impl From<reqwest::Error> for CapabilityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

#[async_trait]
pub trait LayoutDetector: Send + Sync {
    async fn detect_layout(&self, image: &RgbImage) -> Result<Vec<Detection>, CapabilityError>;
}

#[async_trait]
pub trait QrDetector: Send + Sync {
    async fn detect_qr(&self, image: &RgbImage) -> Result<Vec<BoxDetection>, CapabilityError>;
}

/// Barcode boxes are only ever whitened, never decoded.
#[async_trait]
pub trait BarcodeDetector: Send + Sync {
    async fn detect_barcodes(
        &self,
        image: &RgbImage,
    ) -> Result<Vec<BoxDetection>, CapabilityError>;
}

/// Vision-LLM transcription of one image.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(
        &self,
        image: &RgbImage,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, CapabilityError>;
}

/// Turns joined page text into a JSON string.
#[async_trait]
pub trait Structurer: Send + Sync {
    async fn structure(&self, system_prompt: &str, text: &str) -> Result<String, CapabilityError>;
}

/// Reviews structured output against the page images.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        image_paths: &[PathBuf],
        content: &Value,
    ) -> Result<ValidationReview, CapabilityError>;
}

/// Review object attached to the final result.
///
/// `Error` is listed first so an `{"error": ..}` object never matches the
/// all-defaulted `Review` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidationReview {
    Error {
        error: String,
    },
    Review {
        #[serde(default)]
        mistakes: Vec<Value>,
        #[serde(default)]
        score: i64,
    },
}

impl ValidationReview {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

/// Detector and extractor set injected into the region classifier and OCR stage.
#[derive(Clone)]
pub struct Capabilities {
    pub layout: Arc<dyn LayoutDetector>,
    pub qr: Arc<dyn QrDetector>,
    pub barcode: Arc<dyn BarcodeDetector>,
    pub extractor: Arc<dyn TextExtractor>,
}

impl Capabilities {
    pub fn new(
        layout: Arc<dyn LayoutDetector>,
        qr: Arc<dyn QrDetector>,
        barcode: Arc<dyn BarcodeDetector>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            layout,
            qr,
            barcode,
            extractor,
        }
    }

    /// Use one HTTP detector service for all three detectors.
    pub fn with_detector(detector: Arc<HttpDetector>, extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            layout: detector.clone(),
            qr: detector.clone(),
            barcode: detector,
            extractor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_review_parses_both_shapes() {
        let review: ValidationReview =
            serde_json::from_str(r#"{"mistakes":[{"field":"total"}],"score":80}"#).unwrap();
        assert!(matches!(review, ValidationReview::Review { score: 80, .. }));

        let err: ValidationReview =
            serde_json::from_str(r#"{"error":"No valid images found for validation"}"#).unwrap();
        assert_eq!(
            err,
            ValidationReview::error("No valid images found for validation")
        );
    }

    #[test]
    fn test_error_kind_names() {
        assert_eq!(
            CapabilityError::Connection("refused".into()).kind(),
            "ConnectionError"
        );
        assert_eq!(
            CapabilityError::RateLimited {
                retry_after_secs: Some(3)
            }
            .kind(),
            "RateLimitError"
        );
    }
}
