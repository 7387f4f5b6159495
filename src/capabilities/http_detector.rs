//! HTTP client for a detector service hosting the layout, QR and barcode models.
//!
//! Each endpoint takes `{"image": <base64 png>, "threshold": f32}` and answers
//! `{"detections": [...]}` in the shape of [`Detection`] or [`BoxDetection`].

use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::api_backend::{encode_png_base64, RawResponse};
use super::{
    BarcodeDetector, BoxDetection, CapabilityError, Detection, LayoutDetector, QrDetector,
};
use crate::config::DetectorConfig;

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    image: &'a str,
    threshold: f32,
}

#[derive(Debug, Deserialize)]
struct DetectResponse<T> {
    #[serde(default = "Vec::new")]
    detections: Vec<T>,
}

pub struct HttpDetector {
    http: reqwest::Client,
    base_url: String,
    layout_threshold: f32,
    box_threshold: f32,
}

impl HttpDetector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CapabilityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CapabilityError::Connection(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            layout_threshold: 0.5,
            box_threshold: 0.5,
        })
    }

    pub fn from_config(config: &DetectorConfig) -> Result<Self, CapabilityError> {
        Ok(Self::new(&config.url, Duration::from_secs(config.timeout_secs))?
            .with_thresholds(config.layout_threshold, config.box_threshold))
    }

    pub fn with_thresholds(mut self, layout: f32, boxes: f32) -> Self {
        self.layout_threshold = layout;
        self.box_threshold = boxes;
        self
    }

    async fn post<T: DeserializeOwned>(
        &self,
        route: &str,
        image: &RgbImage,
        threshold: f32,
    ) -> Result<Vec<T>, CapabilityError> {
        let encoded = encode_png_base64(image)?;
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), route);
        let response = self
            .http
            .post(&url)
            .json(&DetectRequest {
                image: &encoded,
                threshold,
            })
            .send()
            .await?;
        let response = RawResponse::read(response).await?;
        if !response.is_success() {
            return Err(response.into_api_error());
        }
        let parsed: DetectResponse<T> = serde_json::from_str(&response.body)
            .map_err(|e| CapabilityError::Parse(format!("{} response: {}", route, e)))?;
        debug!("detector /{}: {} detections", route, parsed.detections.len());
        Ok(parsed.detections)
    }
}

#[async_trait]
impl LayoutDetector for HttpDetector {
    async fn detect_layout(&self, image: &RgbImage) -> Result<Vec<Detection>, CapabilityError> {
        self.post("layout", image, self.layout_threshold).await
    }
}

#[async_trait]
impl QrDetector for HttpDetector {
    async fn detect_qr(&self, image: &RgbImage) -> Result<Vec<BoxDetection>, CapabilityError> {
        self.post("qr", image, self.box_threshold).await
    }
}

#[async_trait]
impl BarcodeDetector for HttpDetector {
    async fn detect_barcodes(
        &self,
        image: &RgbImage,
    ) -> Result<Vec<BoxDetection>, CapabilityError> {
        self.post("barcode", image, self.box_threshold).await
    }
}
