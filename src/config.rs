//! Configuration for the normalizer

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{NormalizerError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Schemas
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,
    /// Pinned schema version; the latest stored version is used when unset
    pub schema_version: Option<String>,

    // Processing
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_validation_policy")]
    pub validation_policy: String,

    // Outputs
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_quarantine_dir")]
    pub quarantine_dir: PathBuf,
    #[serde(default = "default_media_topic")]
    pub media_topic: String,

    // Media batching
    #[serde(default = "default_max_parallel_downloads")]
    pub max_parallel_downloads: usize,
    /// Overrides every platform's video bitrate assumption
    pub video_bytes_per_second: Option<u64>,

    // Metrics
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    pub metrics_file: Option<PathBuf>,
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("./schemas")
}

fn default_worker_count() -> usize {
    4
}

fn default_validation_policy() -> String {
    "keep".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data/output")
}

fn default_quarantine_dir() -> PathBuf {
    PathBuf::from("./data/quarantine")
}

fn default_media_topic() -> String {
    "batch-media-processing-requests".to_string()
}

fn default_max_parallel_downloads() -> usize {
    10
}

fn default_metrics_enabled() -> bool {
    true
}

const VALIDATION_POLICIES: &[&str] = &["keep", "quarantine", "drop"];

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_dir: default_schema_dir(),
            schema_version: None,
            worker_count: default_worker_count(),
            validation_policy: default_validation_policy(),
            output_dir: default_output_dir(),
            quarantine_dir: default_quarantine_dir(),
            media_topic: default_media_topic(),
            max_parallel_downloads: default_max_parallel_downloads(),
            video_bytes_per_second: None,
            metrics_enabled: default_metrics_enabled(),
            metrics_file: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        // Build config from environment
        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(invalid("worker_count must be at least 1"));
        }
        if !VALIDATION_POLICIES.contains(&self.validation_policy.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "validation_policy must be one of {:?}, got {:?}",
                VALIDATION_POLICIES, self.validation_policy
            )));
        }
        if self.max_parallel_downloads == 0 {
            return Err(invalid("max_parallel_downloads must be at least 1"));
        }
        if self.video_bytes_per_second == Some(0) {
            return Err(invalid("video_bytes_per_second must be positive"));
        }
        Ok(())
    }

    /// Checks if a metrics snapshot should be written
    pub fn metrics_path(&self) -> Option<&PathBuf> {
        if self.metrics_enabled {
            self.metrics_file.as_ref()
        } else {
            None
        }
    }
}

fn invalid(message: impl Into<String>) -> NormalizerError {
    NormalizerError::Config(config::ConfigError::Message(message.into()))
}
