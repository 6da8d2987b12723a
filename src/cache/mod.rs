//! Content-addressable cache
//!
//! Composes a [`CacheIndex`] (key -> entry) with a [`ContentStore`]
//! (hash -> bytes). Every read is verified against the stored integrity.
//!
//! # Layout
//!
//! | Path | Contents |
//! |------|----------|
//! | `index-v5/<b1>/<b2>/<hash-of-key>` | checksummed index line |
//! | `content-v2/<algo>/<b1>/<b2>/<hash-of-content>` | raw bytes |
//! | `tmp/` | staging for atomic writes |
//!
//! Removing a key drops only its index entry. Blobs may be shared by other
//! keys and are left in place.

pub mod content;
pub mod index;
pub mod integrity;

pub use content::ContentStore;
pub use index::{CacheEntry, CacheIndex};
pub use integrity::{Algorithm, Integrity};

use crate::error::{PatchError, PatchResult};
use chrono::Utc;
use futures_util::{Stream, TryStreamExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Options for [`ContentCache::put`]
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Expected integrity of the data; the write fails if it doesn't match
    pub integrity: Option<String>,

    /// Algorithm used when `integrity` is not supplied
    pub algorithm: Algorithm,

    /// Free-form metadata stored with the index entry
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PutOptions {
    /// Options pinned to an expected integrity
    pub fn with_integrity(integrity: impl Into<String>) -> Self {
        Self {
            integrity: Some(integrity.into()),
            ..Self::default()
        }
    }

    /// Attach a metadata field
    pub fn metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Options for [`ContentCache::get`]
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Integrity the caller expects, checked in addition to the stored one
    pub integrity: Option<String>,
}

impl GetOptions {
    pub fn with_integrity(integrity: impl Into<String>) -> Self {
        Self {
            integrity: Some(integrity.into()),
        }
    }
}

/// Result of [`ContentCache::verify`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Number of entries checked
    pub checked: usize,
    /// Keys whose blob is missing
    pub missing: Vec<String>,
    /// Keys whose blob no longer matches its integrity
    pub corrupt: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }
}

/// Content-addressable cache rooted at one directory
#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
    index: CacheIndex,
    content: ContentStore,
}

impl ContentCache {
    /// Open (lazily) a cache at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            index: CacheIndex::new(dir.clone()),
            content: ContentStore::new(dir.clone()),
            dir,
        }
    }

    /// Cache root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `data` under `key`, returning its integrity
    pub async fn put(&self, key: &str, data: &[u8], opts: PutOptions) -> PatchResult<Integrity> {
        index::validate_key(key)?;

        let integrity = match opts.integrity.as_deref() {
            Some(expected) => {
                let expected = Integrity::parse(expected)?;
                expected.check(key, data)?;
                expected
            }
            None => Integrity::compute(opts.algorithm, data),
        };

        self.content.write(&integrity, data).await?;
        self.index
            .insert(&CacheEntry {
                key: key.to_string(),
                integrity: integrity.clone(),
                time: Utc::now().timestamp_millis(),
                size: data.len() as u64,
                metadata: opts.metadata,
            })
            .await?;

        debug!("Cached {} ({} bytes) as {}", key, data.len(), integrity);
        Ok(integrity)
    }

    /// Fetch the bytes stored under `key`, verifying integrity
    pub async fn get(&self, key: &str, opts: GetOptions) -> PatchResult<Vec<u8>> {
        let entry = self
            .index
            .find(key)
            .await?
            .ok_or_else(|| PatchError::CacheKeyNotFound(key.to_string()))?;

        let data = self.content.read(key, &entry.integrity).await?;

        if let Some(expected) = opts.integrity.as_deref() {
            Integrity::parse(expected)?.check(key, &data)?;
        }

        Ok(data)
    }

    /// Index entry for `key` without reading content
    pub async fn info(&self, key: &str) -> PatchResult<Option<CacheEntry>> {
        self.index.find(key).await
    }

    /// Remove the index entry for `key`, returning whether one existed
    pub async fn remove(&self, key: &str) -> PatchResult<bool> {
        let removed = self.index.delete(key).await?;
        if removed {
            debug!("Removed cache key {}", key);
        }
        Ok(removed)
    }

    /// Lazily list every entry. O(total entries); see [`CacheIndex::entries`].
    pub fn list(&self) -> impl Stream<Item = PatchResult<CacheEntry>> + Send + 'static {
        self.index.entries()
    }

    /// Check every entry's blob against its integrity
    pub async fn verify(&self) -> PatchResult<VerifyReport> {
        let mut report = VerifyReport::default();
        let mut entries = Box::pin(self.list());

        while let Some(entry) = entries.try_next().await? {
            report.checked += 1;
            match self.content.read(&entry.key, &entry.integrity).await {
                Ok(_) => {}
                Err(e) if e.is_integrity_mismatch() => report.corrupt.push(entry.key),
                Err(e) if e.is_not_found() => report.missing.push(entry.key),
                Err(e) => return Err(e),
            }
        }

        info!(
            "Verified {} cache entries ({} missing, {} corrupt)",
            report.checked,
            report.missing.len(),
            report.corrupt.len()
        );
        Ok(report)
    }

    /// Delete every index entry and blob
    pub async fn clear(&self) -> PatchResult<()> {
        for sub in [index::INDEX_DIR, content::CONTENT_DIR, content::TMP_DIR] {
            let path = self.dir.join(sub);
            match fs::remove_dir_all(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(PatchError::io(format!("removing {}", path.display()), e));
                }
            }
        }
        info!("Cleared cache at {}", self.dir.display());
        Ok(())
    }
}
