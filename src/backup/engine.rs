//! Backup, restore and cleanup of patched files
//!
//! Per patch uuid the lifecycle is:
//!
//! | State | Entered by |
//! |-------|-----------|
//! | not backed up | - |
//! | backed up | [`BackupEngine::backup`] |
//! | restored | [`BackupEngine::restore`] |
//! | cleaned up | [`BackupEngine::cleanup`] |
//!
//! Original bytes go to the content cache under [`derive_backup_key`]; the
//! list of files per patch lives in the [`MetadataIndex`], so no operation
//! here ever enumerates the cache.

use crate::atomic;
use crate::backup::metadata::{validate_uuid, BackupEntry, BackupStats, MetadataIndex};
use crate::cache::index::sha256_hex;
use crate::cache::{Algorithm, ContentCache, GetOptions, Integrity, PutOptions};
use crate::error::{PatchError, PatchResult};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Hex characters of the path hash kept in a backup key
const PATH_HASH_LEN: usize = 16;

/// Cache key holding the original bytes of `file_path` for patch `uuid`
pub fn derive_backup_key(uuid: &str, file_path: &str) -> String {
    let path_hash = sha256_hex(file_path.as_bytes());
    format!("backup:{}:{}", uuid, &path_hash[..PATH_HASH_LEN])
}

/// One file saved by [`BackupEngine::backup`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackedUpFile {
    pub path: String,
    pub integrity: Integrity,
    pub size: u64,
}

/// Outcome of a restore
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub uuid: String,
    /// Paths written back
    pub restored: Vec<String>,
    /// Paths that could not be restored, with the reason
    pub failed: Vec<(String, PatchError)>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn any failure into an error
    pub fn into_result(self) -> PatchResult<Vec<String>> {
        if self.failed.is_empty() {
            return Ok(self.restored);
        }
        Err(PatchError::RestoreIncomplete {
            uuid: self.uuid,
            failed: self.failed.len(),
            total: self.failed.len() + self.restored.len(),
        })
    }
}

/// Outcome of a cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Cache keys that were present and removed
    pub removed_keys: usize,
    /// Whether the metadata file existed
    pub metadata_removed: bool,
}

/// Backup engine over a cache and a metadata index
#[derive(Debug, Clone)]
pub struct BackupEngine {
    cache: ContentCache,
    metadata: MetadataIndex,
    strict_restore: bool,
}

impl BackupEngine {
    pub fn new(cache: ContentCache, metadata: MetadataIndex) -> Self {
        Self {
            cache,
            metadata,
            strict_restore: false,
        }
    }

    /// Restore all files or none
    pub fn with_strict_restore(mut self, strict: bool) -> Self {
        self.strict_restore = strict;
        self
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn metadata(&self) -> &MetadataIndex {
        &self.metadata
    }

    /// Save the current bytes of each file before it is patched.
    ///
    /// Relative paths are resolved against the current directory and
    /// recorded as absolute paths. Files are processed in the given order.
    /// If one fails, the files before it stay cached and indexed; the caller
    /// decides whether to abandon the patch.
    pub async fn backup(&self, uuid: &str, files: &[PathBuf]) -> PatchResult<Vec<BackedUpFile>> {
        validate_uuid(uuid)?;
        let mut saved = Vec::with_capacity(files.len());

        for file in files {
            saved.push(self.backup_file(uuid, file).await?);
        }

        info!("Backed up {} file(s) for patch {}", saved.len(), uuid);
        Ok(saved)
    }

    async fn backup_file(&self, uuid: &str, file: &Path) -> PatchResult<BackedUpFile> {
        let file = absolute_path(file)?;
        let file = file.as_path();
        let path = path_str(file)?;
        let data = match fs::read(file).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PatchError::PathNotFound(file.to_path_buf()));
            }
            Err(e) => return Err(PatchError::io(format!("reading {}", file.display()), e)),
        };

        let integrity = Integrity::compute(Algorithm::Sha256, &data);
        let size = data.len() as u64;
        let key = derive_backup_key(uuid, path);

        let opts = PutOptions::with_integrity(integrity.to_string())
            .metadata("originalPath", path)
            .metadata("uuid", uuid);
        self.cache.put(&key, &data, opts).await?;
        self.metadata
            .record_backup(uuid, path, &integrity.to_string(), size)
            .await?;

        debug!("Backed up {} as {}", path, key);
        Ok(BackedUpFile {
            path: path.to_string(),
            integrity,
            size,
        })
    }

    /// Files backed up for `uuid`
    pub async fn list_backups(&self, uuid: &str) -> PatchResult<BTreeMap<String, BackupEntry>> {
        self.metadata.list_backups(uuid).await
    }

    /// Write every backed up file of `uuid` back to its original path.
    ///
    /// Fails with `BackupNotFound` if nothing was backed up. By default a
    /// file whose blob is missing or corrupt is reported in the returned
    /// report while the other files are still restored. With strict restore
    /// every blob is fetched and verified first, and nothing is written
    /// unless all of them are good. If a write then fails, the files already
    /// written are put back to their prior contents before the error is
    /// returned.
    pub async fn restore(&self, uuid: &str) -> PatchResult<RestoreReport> {
        let entries = self.metadata.list_backups(uuid).await?;

        if self.strict_restore {
            return self.restore_strict(uuid, &entries).await;
        }

        let mut report = RestoreReport {
            uuid: uuid.to_string(),
            ..RestoreReport::default()
        };

        for (path, entry) in &entries {
            match self.fetch(uuid, path, entry).await {
                Ok(data) => match write_back(Path::new(path), &data).await {
                    Ok(()) => report.restored.push(path.clone()),
                    Err(e) => {
                        warn!("Failed to write {} for patch {}: {}", path, uuid, e);
                        report.failed.push((path.clone(), e));
                    }
                },
                Err(e) => {
                    warn!("Failed to restore {} for patch {}: {}", path, uuid, e);
                    report.failed.push((path.clone(), e));
                }
            }
        }

        info!(
            "Restored {}/{} file(s) for patch {}",
            report.restored.len(),
            entries.len(),
            uuid
        );
        Ok(report)
    }

    async fn restore_strict(
        &self,
        uuid: &str,
        entries: &BTreeMap<String, BackupEntry>,
    ) -> PatchResult<RestoreReport> {
        let mut fetched = Vec::with_capacity(entries.len());
        for (path, entry) in entries {
            fetched.push((path, self.fetch(uuid, path, entry).await?));
        }

        let mut written: Vec<(&String, Option<Vec<u8>>)> = Vec::with_capacity(fetched.len());
        for (path, data) in &fetched {
            let target = Path::new(path.as_str());
            let step = match atomic::read_optional(target).await {
                Ok(prior) => write_back(target, data).await.map(|()| prior),
                Err(e) => Err(e),
            };

            match step {
                Ok(prior) => written.push((*path, prior)),
                Err(e) => {
                    warn!(
                        "Failed to write {} for patch {}, reverting {} file(s): {}",
                        path,
                        uuid,
                        written.len(),
                        e
                    );
                    revert(written).await;
                    return Err(e);
                }
            }
        }

        let restored: Vec<String> = written.into_iter().map(|(path, _)| path.clone()).collect();
        info!("Restored all {} file(s) for patch {}", restored.len(), uuid);
        Ok(RestoreReport {
            uuid: uuid.to_string(),
            restored,
            failed: vec![],
        })
    }

    /// Restore a single backed up file of `uuid`.
    ///
    /// A relative `file_path` is resolved against the current directory.
    pub async fn restore_file(&self, uuid: &str, file_path: &str) -> PatchResult<()> {
        let absolute = absolute_path(Path::new(file_path))?;
        let file_path = path_str(&absolute)?;

        let entries = self.metadata.list_backups(uuid).await?;
        let entry = entries
            .get(file_path)
            .ok_or_else(|| PatchError::CacheKeyNotFound(derive_backup_key(uuid, file_path)))?;

        let data = self.fetch(uuid, file_path, entry).await?;
        write_back(&absolute, &data).await?;
        info!("Restored {} for patch {}", file_path, uuid);
        Ok(())
    }

    async fn fetch(&self, uuid: &str, path: &str, entry: &BackupEntry) -> PatchResult<Vec<u8>> {
        let key = derive_backup_key(uuid, path);
        self.cache
            .get(&key, GetOptions::with_integrity(entry.hash.clone()))
            .await
    }

    /// Drop the cached originals and the metadata of `uuid`.
    ///
    /// Running it again is a no-op.
    pub async fn cleanup(&self, uuid: &str) -> PatchResult<CleanupReport> {
        let entries = match self.metadata.list_backups(uuid).await {
            Ok(entries) => entries,
            Err(PatchError::BackupNotFound(_)) => {
                debug!("Nothing to clean up for patch {}", uuid);
                return Ok(CleanupReport::default());
            }
            Err(e) => return Err(e),
        };

        let mut report = CleanupReport::default();
        for path in entries.keys() {
            if self.cache.remove(&derive_backup_key(uuid, path)).await? {
                report.removed_keys += 1;
            }
        }
        report.metadata_removed = self.metadata.delete_metadata(uuid).await?;

        info!(
            "Cleaned up {} backup(s) for patch {}",
            report.removed_keys, uuid
        );
        Ok(report)
    }

    /// Clean up every patch whose backups are older than `max_age`
    pub async fn prune(&self, max_age: chrono::Duration) -> PatchResult<Vec<String>> {
        let cutoff = Utc::now() - max_age;
        let stale = self.metadata.patched_before(cutoff).await?;

        for uuid in &stale {
            self.cleanup(uuid).await?;
        }

        if !stale.is_empty() {
            info!("Pruned {} stale patch backup(s)", stale.len());
        }
        Ok(stale)
    }

    pub async fn stats(&self) -> PatchResult<BackupStats> {
        self.metadata.stats().await
    }
}

/// Put files back to the contents they had before a failed strict restore
async fn revert(written: Vec<(&String, Option<Vec<u8>>)>) {
    for (path, prior) in written.into_iter().rev() {
        let target = Path::new(path.as_str());
        let result = match prior {
            Some(bytes) => write_back(target, &bytes).await,
            None => atomic::remove_if_exists(target).await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!("Could not revert {}: {}", path, e);
        }
    }
}

fn absolute_path(path: &Path) -> PatchResult<PathBuf> {
    std::path::absolute(path)
        .map_err(|e| PatchError::io(format!("resolving {}", path.display()), e))
}

fn path_str(path: &Path) -> PatchResult<&str> {
    path.to_str().ok_or_else(|| PatchError::InvalidKey {
        key: path.to_string_lossy().into_owned(),
        reason: "path is not valid UTF-8".to_string(),
    })
}

/// Overwrite `path` with `data`, keeping the existing file mode
async fn write_back(path: &Path, data: &[u8]) -> PatchResult<()> {
    let permissions = fs::metadata(path).await.ok().map(|m| m.permissions());

    atomic::write_atomic(path, data, None).await?;

    if let Some(permissions) = permissions {
        fs::set_permissions(path, permissions)
            .await
            .map_err(|e| PatchError::io(format!("restoring permissions of {}", path.display()), e))?;
    }
    Ok(())
}
