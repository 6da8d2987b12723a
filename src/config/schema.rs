//! Configuration schema for socket-patch
//!
//! Configuration is stored at `~/.config/socket-patch/config.toml`

use crate::manifest::DEFAULT_MANIFEST_PATH;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Where backups, cache and manifest live
    pub storage: StorageConfig,

    /// Restore behaviour
    pub restore: RestoreConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Socket home directory (default: $SOCKET_HOME, else ~/.socket)
    pub home: Option<PathBuf>,

    /// Manifest path relative to the project root
    pub manifest_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            home: None,
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
        }
    }
}

/// Restore settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Restore every file of a patch or none of them
    pub strict: bool,

    /// Remove backups older than N days when pruning (0 = disabled)
    pub prune_after_days: u32,
}
