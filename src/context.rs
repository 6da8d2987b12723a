//! Top-level handle wiring the cache, backup index and manifest together
//!
//! One `PatchContext` is built per process from the loaded [`Config`] and
//! passed by reference to whatever drives patch operations. The manifest
//! write queue lives here so every [`ManifestStore`] handed out shares it.

use crate::backup::{BackupEngine, MetadataIndex};
use crate::cache::ContentCache;
use crate::config::{Config, ConfigManager};
use crate::manifest::{ManifestStore, WriteQueue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Shared state for patch operations
#[derive(Debug, Clone)]
pub struct PatchContext {
    engine: BackupEngine,
    queue: Arc<WriteQueue>,
    manifest_path: PathBuf,
}

impl PatchContext {
    /// Build from configuration
    pub fn new(config: &Config) -> Self {
        let home = ConfigManager::socket_home(config);
        debug!("Using socket home {}", home.display());

        Self::from_parts(
            ContentCache::new(ConfigManager::cache_dir(config)),
            MetadataIndex::new(ConfigManager::backup_metadata_dir(config)),
            config.restore.strict,
            config.storage.manifest_path.clone(),
        )
    }

    /// Build from explicit parts
    pub fn from_parts(
        cache: ContentCache,
        metadata: MetadataIndex,
        strict_restore: bool,
        manifest_path: PathBuf,
    ) -> Self {
        Self {
            engine: BackupEngine::new(cache, metadata).with_strict_restore(strict_restore),
            queue: Arc::new(WriteQueue::new()),
            manifest_path,
        }
    }

    pub fn engine(&self) -> &BackupEngine {
        &self.engine
    }

    /// Manifest store for `project_root`, sharing this context's write queue
    pub fn manifest(&self, project_root: &Path) -> ManifestStore {
        ManifestStore::with_relative_path(project_root, &self.manifest_path, self.queue.clone())
    }
}
