use crate::defaults;
use crate::error::{NarratorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub normalizer: NormalizerConfig,
    pub daemon: DaemonConfig,
}

/// Where job records, audio artifacts and voice samples live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Generation resource configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub temperature: f32,
    pub top_p: f32,
    pub words_per_chunk: usize,
    /// Client-side timeout; `None` waits for as long as the server takes.
    pub timeout_secs: Option<u64>,
}

/// Text normalization service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizerConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

/// Background daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub workers: usize,
    pub socket: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::GENERATION_ENDPOINT.to_string(),
            temperature: defaults::TEMPERATURE,
            top_p: defaults::TOP_P,
            words_per_chunk: defaults::WORDS_PER_CHUNK,
            timeout_secs: None,
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: defaults::NORMALIZER_BASE_URL.to_string(),
            model: defaults::NORMALIZER_MODEL.to_string(),
            api_key_env: defaults::NORMALIZER_API_KEY_ENV.to_string(),
            timeout_secs: defaults::NORMALIZER_TIMEOUT_SECS,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workers: defaults::WORKERS,
            socket: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("narrator")
}

impl StorageConfig {
    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }

    pub fn voices_dir(&self) -> PathBuf {
        self.data_dir.join("voices")
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - NARRATOR_DATA_DIR → storage.data_dir
    /// - NARRATOR_ENDPOINT → generation.endpoint
    /// - NARRATOR_WORDS_PER_CHUNK → generation.words_per_chunk (ignored if not a number)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("NARRATOR_DATA_DIR")
            && !dir.is_empty()
        {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Ok(endpoint) = std::env::var("NARRATOR_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.generation.endpoint = endpoint;
        }

        if let Ok(words) = std::env::var("NARRATOR_WORDS_PER_CHUNK")
            && let Ok(words) = words.trim().parse::<usize>()
        {
            self.generation.words_per_chunk = words;
        }

        self
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.generation.words_per_chunk == 0 {
            return Err(NarratorError::ConfigInvalidValue {
                key: "generation.words_per_chunk".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.generation.temperature.is_nan() || self.generation.temperature < 0.0 {
            return Err(NarratorError::ConfigInvalidValue {
                key: "generation.temperature".to_string(),
                message: "must be zero or positive".to_string(),
            });
        }
        let top_p = self.generation.top_p;
        if top_p.is_nan() || top_p <= 0.0 || top_p > 1.0 {
            return Err(NarratorError::ConfigInvalidValue {
                key: "generation.top_p".to_string(),
                message: "must be in (0, 1]".to_string(),
            });
        }
        if self.daemon.workers == 0 {
            return Err(NarratorError::ConfigInvalidValue {
                key: "daemon.workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/narrator/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("narrator")
            .join("config.toml")
    }
}
