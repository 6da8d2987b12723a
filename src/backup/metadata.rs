//! Per-patch backup metadata index
//!
//! One small JSON file per patch UUID at `<dir>/<uuid>.json`, listing every
//! file the patch touched and the hash needed to fetch its original bytes
//! from the cache. Per-patch lookups read exactly one file, so they never
//! depend on how many entries the cache holds.
//!
//! These files are local to the machine and never committed.

use crate::atomic;
use crate::error::{PatchError, PatchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Backup record for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    /// Integrity string of the original bytes
    pub hash: String,

    /// Original size in bytes
    pub size: u64,

    /// When the file was backed up
    pub backed_up_at: DateTime<Utc>,

    /// Path the bytes were read from
    pub original_path: String,
}

/// Backup metadata for one patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub uuid: String,

    /// When the first file of this patch was backed up
    pub patched_at: DateTime<Utc>,

    /// Backed up files keyed by path
    #[serde(default)]
    pub backups: BTreeMap<String, BackupEntry>,
}

impl BackupMetadata {
    pub fn new(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            patched_at: Utc::now(),
            backups: BTreeMap::new(),
        }
    }

    /// Total bytes backed up for this patch
    pub fn total_size(&self) -> u64 {
        self.backups.values().map(|b| b.size).sum()
    }
}

/// Aggregate numbers over every patch with local backups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    pub patch_count: usize,
    pub file_count: usize,
    pub total_size: u64,
}

/// UUIDs become file names, so restrict them to a safe alphabet
pub fn validate_uuid(uuid: &str) -> PatchResult<()> {
    let valid = !uuid.is_empty()
        && uuid.len() <= 128
        && uuid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(PatchError::InvalidKey {
            key: uuid.to_string(),
            reason: "patch uuid must be ASCII alphanumerics, '-' or '_'".to_string(),
        })
    }
}

/// Directory of per-patch metadata files
#[derive(Debug, Clone)]
pub struct MetadataIndex {
    dir: PathBuf,
}

impl MetadataIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Metadata file for `uuid`
    pub fn path_for(&self, uuid: &str) -> PatchResult<PathBuf> {
        validate_uuid(uuid)?;
        Ok(self.dir.join(format!("{uuid}.json")))
    }

    /// Load the metadata for `uuid`, if any
    pub async fn load(&self, uuid: &str) -> PatchResult<Option<BackupMetadata>> {
        let path = self.path_for(uuid)?;
        let Some(bytes) = atomic::read_optional(&path).await? else {
            return Ok(None);
        };

        let metadata: BackupMetadata =
            serde_json::from_slice(&bytes).map_err(|e| PatchError::MetadataInvalid {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if metadata.uuid != uuid {
            return Err(PatchError::MetadataInvalid {
                path,
                reason: format!("file records uuid {:?}", metadata.uuid),
            });
        }

        Ok(Some(metadata))
    }

    async fn save(&self, metadata: &BackupMetadata) -> PatchResult<()> {
        let path = self.path_for(&metadata.uuid)?;
        let mut content = serde_json::to_string_pretty(metadata)?;
        content.push('\n');
        atomic::write_atomic(&path, content.as_bytes(), None).await
    }

    /// Insert or overwrite the entry for `file_path` under `uuid`
    pub async fn record_backup(
        &self,
        uuid: &str,
        file_path: &str,
        hash: &str,
        size: u64,
    ) -> PatchResult<()> {
        let mut metadata = self
            .load(uuid)
            .await?
            .unwrap_or_else(|| BackupMetadata::new(uuid));

        metadata.backups.insert(
            file_path.to_string(),
            BackupEntry {
                hash: hash.to_string(),
                size,
                backed_up_at: Utc::now(),
                original_path: file_path.to_string(),
            },
        );

        self.save(&metadata).await?;
        debug!("Recorded backup of {} for patch {}", file_path, uuid);
        Ok(())
    }

    /// Backed up files for `uuid`; `BackupNotFound` if none were recorded
    pub async fn list_backups(&self, uuid: &str) -> PatchResult<BTreeMap<String, BackupEntry>> {
        self.load(uuid)
            .await?
            .map(|m| m.backups)
            .ok_or_else(|| PatchError::BackupNotFound(uuid.to_string()))
    }

    /// Whether `file_path` was backed up for `uuid`
    pub async fn has_backup(&self, uuid: &str, file_path: &str) -> PatchResult<bool> {
        Ok(self
            .load(uuid)
            .await?
            .is_some_and(|m| m.backups.contains_key(file_path)))
    }

    /// Remove the metadata file; no error if it is already gone
    pub async fn delete_metadata(&self, uuid: &str) -> PatchResult<bool> {
        let removed = atomic::remove_if_exists(&self.path_for(uuid)?).await?;
        if removed {
            debug!("Deleted backup metadata for patch {}", uuid);
        }
        Ok(removed)
    }

    /// Every patch uuid with a metadata file. Walks the directory.
    pub async fn list_patch_uuids(&self) -> PatchResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(PatchError::io(
                    format!("reading metadata directory {}", self.dir.display()),
                    e,
                ))
            }
        };

        let mut uuids = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PatchError::io("reading metadata entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if validate_uuid(stem).is_ok() {
                        uuids.push(stem.to_string());
                    }
                }
            }
        }

        uuids.sort();
        Ok(uuids)
    }

    /// Counts across every patch. Unreadable files are skipped.
    pub async fn stats(&self) -> PatchResult<BackupStats> {
        let mut stats = BackupStats::default();

        for uuid in self.list_patch_uuids().await? {
            match self.load(&uuid).await {
                Ok(Some(metadata)) => {
                    stats.patch_count += 1;
                    stats.file_count += metadata.backups.len();
                    stats.total_size += metadata.total_size();
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping backup metadata for {}: {}", uuid, e),
            }
        }

        Ok(stats)
    }

    /// Patch uuids whose backups were taken before `cutoff`
    pub async fn patched_before(&self, cutoff: DateTime<Utc>) -> PatchResult<Vec<String>> {
        let mut old = vec![];

        for uuid in self.list_patch_uuids().await? {
            match self.load(&uuid).await {
                Ok(Some(metadata)) if metadata.patched_at < cutoff => old.push(uuid),
                Ok(_) => {}
                Err(e) => warn!("Skipping backup metadata for {}: {}", uuid, e),
            }
        }

        Ok(old)
    }
}
