//! OpenAI-compatible chat-completions adapters.
//!
//! One client type serves three roles:
//! - page transcription against a vision model (usually a local vLLM server)
//! - structuring joined page text into JSON
//! - validating the structured JSON against the page images
//!
//! HTTP 429 responses are retried only when `rate_limit_retries` is non-zero.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::api_backend::{
    encode_file_jpeg_base64, encode_png_base64, retry_on_rate_limit, RawResponse,
};
use super::{CapabilityError, Structurer, TextExtractor, ValidationReview, Validator};
use crate::config::LlmConfig;

const VALIDATION_SYSTEM_PROMPT: &str = "You are a STRICT OCR validation engine.\n\
You receive a RAW JSON STRING.\n\
Validate it against the PDF images.\n\n\
RULES:\n\
- Do NOT fix values\n\
- Do NOT infer missing data\n\
- Only report mistakes\n\
- Also report structural mistakes\n\
- Check whether multiple invoices are written under the JSON correctly.\n\
- Output MUST be valid JSON with a 'mistakes' list and a 'score' (0-100)\n\
- If perfect, 'mistakes' should be empty and 'score' 100.\n";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl ChatMessage {
    fn system(text: &str) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.to_string()),
        }
    }

    fn user_text(text: &str) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.to_string()),
        }
    }

    fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(parts),
        }
    }
}

fn image_part(mime: &str, b64: String) -> ContentPart {
    ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: format!("data:{};base64,{}", mime, b64),
        },
    }
}

/// Minimal chat-completions client.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rate_limit_retries: u32,
    name: &'static str,
}

impl OpenAiClient {
    pub fn new(
        name: &'static str,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CapabilityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CapabilityError::Connection(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
            rate_limit_retries: 0,
            name,
        })
    }

    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, CapabilityError> {
        let url = self.endpoint();
        debug!("{}: POST {} (model {})", self.name, url, request.model);

        let http = &self.http;
        let url = url.as_str();
        let api_key = self.api_key.as_deref();
        let response = retry_on_rate_limit(self.name, self.rate_limit_retries, move || async move {
            let mut builder = http.post(url).json(request);
            if let Some(key) = api_key {
                builder = builder.bearer_auth(key);
            }
            RawResponse::read(builder.send().await?).await
        })
        .await?;

        if !response.is_success() {
            return Err(response.into_api_error());
        }

        let parsed: ChatResponse = serde_json::from_str(&response.body)
            .map_err(|e| CapabilityError::Parse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(CapabilityError::Api {
                status: response.status,
                message: error.message,
            });
        }

        parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .ok_or(CapabilityError::EmptyResponse)
    }
}

/// Page transcription through a vision model.
pub struct OpenAiExtractor {
    client: OpenAiClient,
    model: String,
}

impl OpenAiExtractor {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, CapabilityError> {
        let client = OpenAiClient::new(
            "extractor",
            &config.extract_url,
            config.extract_api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )?
        .with_rate_limit_retries(config.rate_limit_retries);
        Ok(Self::new(client, &config.extract_model))
    }
}

/// Page transcription request. The sampling knobs curb repeated table rows.
fn extraction_request(model: &str, png_b64: String, prompt: &str, max_tokens: u32) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user_parts(vec![
                image_part("image/png", png_b64),
                ContentPart::Text {
                    text: prompt.to_string(),
                },
            ]),
        ],
        max_tokens: Some(max_tokens),
        temperature: 0.0,
        response_format: None,
        repetition_penalty: Some(1.1),
        top_p: Some(1.0),
    }
}

#[async_trait]
impl TextExtractor for OpenAiExtractor {
    async fn extract(
        &self,
        image: &RgbImage,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, CapabilityError> {
        let b64 = encode_png_base64(image)?;
        let request = extraction_request(&self.model, b64, prompt, max_tokens);
        self.client.complete(&request).await
    }
}

/// Structuring of joined page text.
pub struct OpenAiStructurer {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiStructurer {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CapabilityError> {
        let client = OpenAiClient::new(
            "structurer",
            &config.openai_url,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )?
        .with_rate_limit_retries(config.rate_limit_retries);
        Ok(Self {
            client,
            model: config.structure_model.clone(),
            temperature: config.structure_temperature,
        })
    }
}

#[async_trait]
impl Structurer for OpenAiStructurer {
    async fn structure(&self, system_prompt: &str, text: &str) -> Result<String, CapabilityError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user_text(text)],
            max_tokens: None,
            temperature: self.temperature,
            response_format: None,
            repetition_penalty: None,
            top_p: None,
        };
        self.client.complete(&request).await
    }
}

/// Review of structured JSON against the page images.
pub struct OpenAiValidator {
    client: OpenAiClient,
    model: String,
}

impl OpenAiValidator {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CapabilityError> {
        let client = OpenAiClient::new(
            "validator",
            &config.openai_url,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )?
        .with_rate_limit_retries(config.rate_limit_retries);
        Ok(Self {
            client,
            model: config.validate_model.clone(),
        })
    }
}

/// Render the structured result as the text block handed to the reviewer.
fn json_block(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Encode every readable page image; unreadable or missing files are skipped.
fn image_parts(image_paths: &[PathBuf]) -> Vec<ContentPart> {
    let mut parts = Vec::new();
    for path in image_paths {
        if !path.exists() {
            warn!("Validation image not found at {}", path.display());
            continue;
        }
        match encode_file_jpeg_base64(path) {
            Ok(b64) => parts.push(image_part("image/jpeg", b64)),
            Err(e) => warn!("Error encoding image {}: {}", path.display(), e),
        }
    }
    parts
}

#[async_trait]
impl Validator for OpenAiValidator {
    async fn validate(
        &self,
        image_paths: &[PathBuf],
        content: &Value,
    ) -> Result<ValidationReview, CapabilityError> {
        let images = image_parts(image_paths);
        if images.is_empty() {
            return Ok(ValidationReview::error("No valid images found for validation"));
        }

        let mut parts = vec![ContentPart::Text {
            text: format!(
                "Below is the extracted JSON as RAW STRING.\n\
                 Compare it STRICTLY against the provided document pages.\n\n\
                 Extracted JSON:\n{}",
                json_block(content)
            ),
        }];
        parts.extend(images);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(VALIDATION_SYSTEM_PROMPT),
                ChatMessage::user_parts(parts),
            ],
            max_tokens: None,
            temperature: 0.0,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
            repetition_penalty: None,
            top_p: None,
        };

        let reply = self.client.complete(&request).await?;
        if reply.trim().is_empty() {
            return Ok(ValidationReview::error("Empty response from validation model"));
        }
        serde_json::from_str(&reply)
            .map_err(|e| CapabilityError::Parse(format!("Validation reply is not a review: {}", e)))
    }
}
