//! Configuration: optional TOML file plus environment overrides.
//!
//! Sub-configs apply environment overrides in their `Default` impls, and
//! again after a file is loaded so the environment always wins.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name looked up in the working directory.
pub const CONFIG_FILENAME: &str = "invoicepipe.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Language-model endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL of the vision model used for page transcription.
    pub extract_url: String,
    pub extract_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_api_key: Option<String>,
    /// Token limit for whole-page transcription.
    pub extract_max_tokens: u32,
    /// Base URL for structuring and validation.
    pub openai_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub structure_model: String,
    pub structure_temperature: f32,
    pub validate_model: String,
    pub timeout_secs: u64,
    /// Retries on HTTP 429. Zero disables retrying.
    pub rate_limit_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl LlmConfig {
    fn base_default() -> Self {
        Self {
            extract_url: "http://127.0.0.1:8000/v1".to_string(),
            extract_model: "nanonets/Nanonets-OCR2-3B".to_string(),
            extract_api_key: None,
            extract_max_tokens: 11000,
            openai_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            structure_model: "gpt-4o-mini".to_string(),
            structure_temperature: 0.4,
            validate_model: "gpt-4o".to_string(),
            timeout_secs: 300,
            rate_limit_retries: 0,
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars: `VLLM_API_URL`, `VLLM_MODEL_NAME`, `OPENAI_API_URL`,
    /// `OPENAI_API_KEY`, `STRUCTURE_MODEL`, `VALIDATE_MODEL`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = env_string("VLLM_API_URL") {
            self.extract_url = url;
        }
        if let Some(model) = env_string("VLLM_MODEL_NAME") {
            self.extract_model = model;
        }
        if let Some(url) = env_string("OPENAI_API_URL") {
            self.openai_url = url;
        }
        if let Some(key) = env_string("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = env_string("STRUCTURE_MODEL") {
            self.structure_model = model;
        }
        if let Some(model) = env_string("VALIDATE_MODEL") {
            self.validate_model = model;
        }
        self
    }
}

/// Detector service hosting layout, QR and barcode models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub url: String,
    pub layout_threshold: f32,
    pub box_threshold: f32,
    pub timeout_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8100".to_string(),
            layout_threshold: 0.5,
            box_threshold: 0.5,
            timeout_secs: 60,
        }
        .with_env_overrides()
    }
}

impl DetectorConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = env_string("DETECTOR_URL") {
            self.url = url;
        }
        self
    }
}

/// Worker, storage and retention settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    /// Per-task page images. Defaults to `<data_dir>/interim`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interim_dir: Option<PathBuf>,
    /// Concurrent consumers on the `gpu` queue.
    pub gpu_concurrency: usize,
    /// Concurrent consumers on the `llm` queue.
    pub llm_concurrency: usize,
    pub raw_text_limit: usize,
    pub interim_ttl_hours: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("invoicepipe"))
            .unwrap_or_else(|| PathBuf::from("storage"));
        Self {
            data_dir,
            interim_dir: None,
            gpu_concurrency: 1,
            llm_concurrency: 20,
            raw_text_limit: 50_000,
            interim_ttl_hours: 72,
            cleanup_interval_secs: 3600,
        }
        .with_env_overrides()
    }
}

impl PipelineConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = env_string("INVOICEPIPE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn interim_dir(&self) -> PathBuf {
        self.interim_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("interim"))
    }
}

/// Region classifier constants.
///
/// Expansion factors are multiples of the QR box size, measured upward and
/// rightward from the QR anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub idcard_expand_up: f32,
    /// Janzour page with a header and no table.
    pub janzour_header_expand_right: f32,
    /// Janzour page lacking header or table.
    pub janzour_fallback_expand_right: f32,
    pub massara_expand_right: f32,
    /// Image boxes at or above this share of the crop area are not whitened.
    pub image_whiten_max_ratio: f32,
    pub barcode_pad_x: f32,
    pub barcode_pad_y: f32,
    /// Gap kept between header/footer boxes and the crop edge, in pixels.
    pub crop_offset: i64,
    pub probe_max_tokens: u32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            idcard_expand_up: 4.0,
            janzour_header_expand_right: 5.8,
            janzour_fallback_expand_right: 5.9,
            massara_expand_right: 5.8,
            image_whiten_max_ratio: 0.3,
            barcode_pad_x: 0.1,
            barcode_pad_y: 0.4,
            crop_offset: 50,
            probe_max_tokens: 512,
        }
    }
}

/// Message broker selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// `memory` or a `redis://` URL.
    pub url: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "memory".to_string(),
        }
        .with_env_overrides()
    }
}

impl BrokerConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = env_string("REDIS_URL") {
            self.url = url;
        }
        self
    }

    pub fn is_memory(&self) -> bool {
        self.url.is_empty() || self.url.eq_ignore_ascii_case("memory")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub detector: DetectorConfig,
    pub pipeline: PipelineConfig,
    pub region: RegionConfig,
    pub broker: BrokerConfig,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load from an explicit path, else `./invoicepipe.toml`, else the
    /// platform config dir, else defaults.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            return Self::load_from_path(path).await;
        }

        for candidate in Self::candidate_paths() {
            if candidate.is_file() {
                tracing::debug!("Using config file {}", candidate.display());
                return Self::load_from_path(&candidate).await;
            }
        }

        Ok(Self::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILENAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("invoicepipe").join("config.toml"));
        }
        paths
    }

    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path).await?;
        let mut config: Config = toml::from_str(&contents)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.llm = self.llm.with_env_overrides();
        self.detector = self.detector.with_env_overrides();
        self.pipeline = self.pipeline.with_env_overrides();
        self.broker = self.broker.with_env_overrides();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invoicepipe.toml");
        std::fs::write(
            &path,
            r#"
[pipeline]
gpu_concurrency = 2
interim_dir = "/tmp/interim"

[region]
image_whiten_max_ratio = 0.25
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).await.unwrap();
        assert_eq!(config.pipeline.gpu_concurrency, 2);
        assert_eq!(config.pipeline.llm_concurrency, 20);
        assert_eq!(config.pipeline.interim_dir(), PathBuf::from("/tmp/interim"));
        assert_eq!(config.region.image_whiten_max_ratio, 0.25);
        assert_eq!(config.region.idcard_expand_up, 4.0);
        assert_eq!(config.region.janzour_fallback_expand_right, 5.9);
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)).await,
            Err(ConfigError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[pipeline\n").unwrap();
        assert!(matches!(
            Config::load(Some(&path)).await,
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_broker_memory_detection() {
        let memory = BrokerConfig {
            url: "memory".to_string(),
        };
        assert!(memory.is_memory());
        let redis = BrokerConfig {
            url: "redis://localhost:6379/0".to_string(),
        };
        assert!(!redis.is_memory());
    }
}
