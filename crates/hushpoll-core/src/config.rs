//! TOML configuration for the daemon.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! runnable configuration:
//!
//! ```toml
//! [storage]
//! db_path = "/var/lib/hushpoll/questionnaires.db"
//!
//! [sweeper]
//! poll_interval_secs = 60
//!
//! [crypto]
//! poly_degree = 8
//! plain_modulus = 17
//! ciph_modulus = 8000000000000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::CryptoParams;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PollConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Expiry sweeper settings.
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Default cipher parameters for newly created questionnaires.
    #[serde(default)]
    pub crypto: CryptoParams,
}

impl PollConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Expiry sweeper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between sweep ticks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("questionnaires.db")
}

const fn default_poll_interval_secs() -> u64 {
    60
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML was invalid.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
