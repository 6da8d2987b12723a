//! Deduplicated blob storage addressed by content hash
//!
//! Blobs live at `content-v2/<algo>/<b1>/<b2>/<rest>` where `b1b2rest` is
//! the hex digest of the content. The path is a pure function of the bytes,
//! so two keys with identical content share one blob.

use crate::atomic;
use crate::cache::integrity::Integrity;
use crate::error::{PatchError, PatchResult};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Content directory name under the cache root
pub const CONTENT_DIR: &str = "content-v2";

/// Staging directory for atomic writes under the cache root
pub const TMP_DIR: &str = "tmp";

/// Content-addressed blob store
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Create a store rooted at the cache directory
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: cache_dir.into(),
        }
    }

    /// Path where the blob for `integrity` is stored
    pub fn path_for(&self, integrity: &Integrity) -> PathBuf {
        let hex = integrity.hex_digest();
        self.root
            .join(CONTENT_DIR)
            .join(integrity.algorithm().as_str())
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex[4..])
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    /// Store `data` under `integrity`.
    ///
    /// Already-present blobs are left alone unless their bytes no longer
    /// match, in which case they are rewritten.
    pub async fn write(&self, integrity: &Integrity, data: &[u8]) -> PatchResult<PathBuf> {
        let path = self.path_for(integrity);

        if let Some(existing) = atomic::read_optional(&path).await? {
            if integrity.matches(&existing) {
                trace!("Blob {} already stored", integrity);
                return Ok(path);
            }
            warn!("Blob {} is corrupt on disk, rewriting", integrity);
        }

        atomic::write_atomic(&path, data, Some(&self.staging_dir())).await?;
        debug!("Stored blob {} ({} bytes)", integrity, data.len());
        Ok(path)
    }

    /// Read the blob for `integrity`, verifying its hash.
    ///
    /// `key` is only used to label errors.
    pub async fn read(&self, key: &str, integrity: &Integrity) -> PatchResult<Vec<u8>> {
        let path = self.path_for(integrity);
        let data = atomic::read_optional(&path)
            .await?
            .ok_or_else(|| PatchError::CacheKeyNotFound(key.to_string()))?;

        integrity.check(key, &data)?;
        Ok(data)
    }

    /// Whether a blob is present for `integrity` (content is not verified)
    pub async fn exists(&self, integrity: &Integrity) -> bool {
        tokio::fs::metadata(self.path_for(integrity)).await.is_ok()
    }

    /// The cache root this store writes under
    pub fn root(&self) -> &Path {
        &self.root
    }
}
