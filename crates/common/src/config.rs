//! Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use remote_store::StorageConfig;

/// Default time-to-live for undownloaded photos: 24 hours.
pub const DEFAULT_TTL_MS: i64 = 86_400_000;

/// Engine configuration, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time-to-live for undownloaded photos, in milliseconds.
    pub ttl_ms: i64,
    /// Where the durable upload queue snapshot lives. Defaults to
    /// `uploads.json` under the per-user data directory.
    pub queue_path: Option<PathBuf>,
    /// Payload object storage backend.
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            queue_path: None,
            storage: StorageConfig::Memory,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Resolve the queue snapshot path, falling back to the per-user data
    /// directory.
    pub fn queue_file(&self) -> PathBuf {
        self.queue_path.clone().unwrap_or_else(default_queue_path)
    }
}

fn default_queue_path() -> PathBuf {
    directories::ProjectDirs::from("app", "duet", "duet")
        .map(|dirs| dirs.data_dir().join("uploads.json"))
        .unwrap_or_else(|| PathBuf::from("uploads.json"))
}
