//! Configuration file
//!
//! JSON, loaded once at startup. Only `data_dir` is required:
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/blockmark",
//!   "batch_size": 50,
//!   "workers": 4,
//!   "max_id_retries": 8,
//!   "stable_id_length": 12,
//!   "legacy_address_version": 1,
//!   "http": { "host": "127.0.0.1", "port": 54321, "api_token": "..." }
//! }
//! ```
//!
//! Invalid configuration is rejected as a whole; nothing is defaulted
//! silently past validation.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::annotation::{legacy_addressing, SUPPORTED_VERSIONS};
use crate::assigner::DEFAULT_MAX_RETRIES;
use crate::http_server::HttpServerConfig;
use crate::observability::{log_event, Event};
use crate::orchestrator::OrchestratorConfig;

/// Allowed stable id lengths
pub const STABLE_ID_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 6..=64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        "BLOCKMARK_CONFIG_INVALID"
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (required)
    pub data_dir: String,

    /// Documents per chunk (default 50)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Worker threads per chunk (default 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Id generation attempts per id (default 8)
    #[serde(default = "default_max_id_retries")]
    pub max_id_retries: u32,

    /// Length of generated stable ids (default 12)
    #[serde(default = "default_stable_id_length")]
    pub stable_id_length: usize,

    /// Legacy address function existing annotations were written with
    #[serde(default = "default_legacy_address_version")]
    pub legacy_address_version: u32,

    #[serde(default)]
    pub http: HttpServerConfig,
}

fn default_batch_size() -> usize {
    50
}
fn default_workers() -> usize {
    4
}
fn default_max_id_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_stable_id_length() -> usize {
    12
}
fn default_legacy_address_version() -> u32 {
    1
}

impl Config {
    /// Defaults for everything but the data directory.
    pub fn new(data_dir: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            batch_size: default_batch_size(),
            workers: default_workers(),
            max_id_retries: default_max_id_retries(),
            stable_id_length: default_stable_id_length(),
            legacy_address_version: default_legacy_address_version(),
            http: HttpServerConfig::default(),
        }
    }

    /// Load and validate configuration from file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::new(format!("Failed to read config: {}", e)))?;
        let config = Self::from_json(&content)?;

        log_event(
            Event::ConfigLoaded,
            &[
                ("data_dir", config.data_dir.as_str()),
                ("path", &path.display().to_string()),
            ],
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| ConfigError::new(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(ConfigError::new("data_dir must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::new("batch_size must be > 0"));
        }
        if self.workers == 0 {
            return Err(ConfigError::new("workers must be > 0"));
        }
        if self.max_id_retries == 0 {
            return Err(ConfigError::new("max_id_retries must be > 0"));
        }
        if !STABLE_ID_LENGTH_RANGE.contains(&self.stable_id_length) {
            return Err(ConfigError::new(format!(
                "stable_id_length must be between {} and {}, got {}",
                STABLE_ID_LENGTH_RANGE.start(),
                STABLE_ID_LENGTH_RANGE.end(),
                self.stable_id_length
            )));
        }
        if !SUPPORTED_VERSIONS.contains(&self.legacy_address_version) {
            return Err(ConfigError::new(format!(
                "Unsupported legacy_address_version: {}. Supported: {:?}",
                self.legacy_address_version, SUPPORTED_VERSIONS
            )));
        }
        if matches!(&self.http.api_token, Some(token) if token.trim().is_empty()) {
            return Err(ConfigError::new("http.api_token must not be empty when set"));
        }
        Ok(())
    }

    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    pub fn orchestrator_config(&self) -> ConfigResult<OrchestratorConfig> {
        let addressing = legacy_addressing(self.legacy_address_version).ok_or_else(|| {
            ConfigError::new(format!(
                "Unsupported legacy_address_version: {}",
                self.legacy_address_version
            ))
        })?;
        Ok(OrchestratorConfig {
            workers: self.workers,
            batch_size: self.batch_size,
            max_id_retries: self.max_id_retries,
            stable_id_length: self.stable_id_length,
            addressing: Arc::from(addressing),
        })
    }
}
