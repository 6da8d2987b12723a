//! Configuration management for socket-patch

pub mod schema;

pub use schema::Config;

use crate::error::{PatchError, PatchResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variable overriding the socket home directory
pub const SOCKET_HOME_ENV: &str = "SOCKET_HOME";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("socket-patch")
            .join("config.toml")
    }

    /// Socket home: config override, then `$SOCKET_HOME`, then `~/.socket`
    pub fn socket_home(config: &Config) -> PathBuf {
        if let Some(home) = &config.storage.home {
            return home.clone();
        }
        if let Some(home) = std::env::var_os(SOCKET_HOME_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".socket")
    }

    /// Content-addressable cache directory
    pub fn cache_dir(config: &Config) -> PathBuf {
        Self::socket_home(config).join("_cacache")
    }

    /// Directory of per-patch backup metadata files
    pub fn backup_metadata_dir(config: &Config) -> PathBuf {
        Self::socket_home(config).join("_patches").join("manifests")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> PatchResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> PatchResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PatchError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| PatchError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> PatchResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                PatchError::io(format!("creating config directory {}", parent.display()), e)
            })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            PatchError::io(format!("writing config to {}", self.config_path.display()), e)
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
