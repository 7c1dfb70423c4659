//! Configuration file parsing for Anchorage
//!
//! Parses `anchorage.toml` configuration files using serde

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Load configuration from a file
pub fn load(path: &Path) -> Result<AnchorageConfig> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: AnchorageConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Root configuration structure
#[derive(Debug, Deserialize)]
pub struct AnchorageConfig {
    /// Global configuration settings
    pub config: GlobalConfig,

    /// Defaults applied when a command omits ownership arguments
    #[serde(default)]
    pub defaults: OwnerDefaults,
}

impl AnchorageConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.config.data_dir.as_os_str().is_empty() {
            return Err(Error::ConfigValidation("data_dir must not be empty".into()));
        }
        Ok(())
    }
}

/// Global configuration settings
#[derive(Debug, Deserialize)]
pub struct GlobalConfig {
    /// Base data directory for network snapshots and the id counter
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/anchorage")
}

/// Default owner identity for created networks and reservations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnerDefaults {
    #[serde(default)]
    pub owner_uid: u32,

    #[serde(default)]
    pub owner_gid: u32,
}
