//! Shared helpers for HTTP capability adapters: image encoding and 429 backoff.

use std::future::Future;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::warn;

use super::CapabilityError;

/// Response pieces the retry loop needs to inspect.
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub async fn read(response: reqwest::Response) -> Result<Self, CapabilityError> {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        Ok(Self {
            status,
            retry_after,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert a non-2xx response into an error, keeping the body short.
    pub fn into_api_error(self) -> CapabilityError {
        let message: String = self.body.chars().take(500).collect();
        CapabilityError::Api {
            status: self.status,
            message,
        }
    }
}

/// Encode an in-memory page as base64 PNG.
pub fn encode_png_base64(image: &RgbImage) -> Result<String, CapabilityError> {
    encode_base64(image, ImageFormat::Png)
}

/// Encode an in-memory page as base64 JPEG.
pub fn encode_jpeg_base64(image: &RgbImage) -> Result<String, CapabilityError> {
    encode_base64(image, ImageFormat::Jpeg)
}

fn encode_base64(image: &RgbImage, format: ImageFormat) -> Result<String, CapabilityError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}

/// Load an image file, normalize it to RGB and encode as base64 JPEG.
pub fn encode_file_jpeg_base64(path: &Path) -> Result<String, CapabilityError> {
    let img = image::open(path)?;
    let rgb = match img {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    };
    encode_jpeg_base64(&rgb)
}

/// Parse a Retry-After header value in seconds, capped at one minute.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    header_value?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(60)))
}

/// Exponential backoff delay for a given attempt, capped at one minute.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(60_000))
}

/// Retry a request on 429 responses with exponential backoff.
///
/// Returns the first non-429 response. With `max_retries == 0` a 429 is
/// reported immediately as [`CapabilityError::RateLimited`].
pub async fn retry_on_rate_limit<F, Fut>(
    adapter: &str,
    max_retries: u32,
    make_request: F,
) -> Result<RawResponse, CapabilityError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<RawResponse, CapabilityError>>,
{
    let mut attempt = 0;
    loop {
        let response = make_request().await?;

        if response.status != 429 {
            return Ok(response);
        }

        let retry_after = response.retry_after.as_deref();
        let retry_after_secs = retry_after.and_then(|s| s.trim().parse::<u64>().ok());

        if attempt >= max_retries {
            return Err(CapabilityError::RateLimited { retry_after_secs });
        }

        let wait = parse_retry_after(retry_after).unwrap_or_else(|| backoff_delay(attempt, 1000));
        warn!(
            "{} rate limited (attempt {}), waiting {:?}",
            adapter,
            attempt + 1,
            wait
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}
