//! Board configuration.
//!
//! Settings come from code defaults, optionally overridden by environment
//! variables:
//!
//! - `POSTBOARD_DATA`: data directory (default `postboard_data`)
//! - `POSTBOARD_DB_PROFILE`: RocksDB tuning profile, `default` or `server`

use crate::error::{BoardError, Result};
use crate::storage::RocksDbConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default data directory name.
pub const DEFAULT_DATA_DIR: &str = "postboard_data";

/// Environment variable naming the data directory.
pub const ENV_DATA_DIR: &str = "POSTBOARD_DATA";

/// Environment variable selecting the RocksDB profile.
pub const ENV_DB_PROFILE: &str = "POSTBOARD_DB_PROFILE";

/// Configuration for opening a board repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    /// Directory holding the database.
    pub data_dir: PathBuf,
    /// RocksDB tunables.
    pub storage: RocksDbConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            storage: RocksDbConfig::default(),
        }
    }
}

impl BoardConfig {
    /// Creates a configuration with default storage settings for `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Builds a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(profile) = lookup(ENV_DB_PROFILE) {
            config.storage = match profile.trim().to_ascii_lowercase().as_str() {
                "" | "default" => RocksDbConfig::default(),
                "server" => RocksDbConfig::for_server(),
                other => {
                    return Err(BoardError::config(format!(
                        "Unknown {} '{}' (expected 'default' or 'server')",
                        ENV_DB_PROFILE, other
                    )))
                }
            };
        }

        config.validate()?;
        debug!(data_dir = ?config.data_dir, "Loaded board configuration");
        Ok(config)
    }

    /// Checks the configuration for unusable values.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(BoardError::config("Data directory cannot be empty"));
        }
        if self.storage.max_open_files == 0 {
            return Err(BoardError::config("max_open_files cannot be 0"));
        }
        if self.storage.write_buffer_size == 0 {
            return Err(BoardError::config("write_buffer_size cannot be 0"));
        }
        Ok(())
    }
}
