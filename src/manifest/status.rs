//! On-disk status of patched files

use crate::atomic;
use crate::cache::integrity::Integrity;
use crate::error::PatchResult;
use crate::manifest::schema::{FilePatch, PatchRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// How a file on disk compares to its manifest hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Content matches `afterHash`
    Applied,
    /// Content matches `beforeHash`
    Original,
    /// Content matches neither
    Modified,
    /// File does not exist
    Missing,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Original => write!(f, "original"),
            Self::Modified => write!(f, "modified"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

/// Per-file status of one patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchStatus {
    pub files: BTreeMap<String, FileStatus>,
}

impl PatchStatus {
    /// Every file carries the patched content
    pub fn is_applied(&self) -> bool {
        self.files.values().all(|s| *s == FileStatus::Applied)
    }

    /// Every file carries the original content
    pub fn is_original(&self) -> bool {
        self.files.values().all(|s| *s == FileStatus::Original)
    }
}

fn hash_matches(expected: &str, data: &[u8]) -> bool {
    Integrity::parse(expected).is_ok_and(|i| i.matches(data))
}

/// Compare one file on disk with its manifest hashes
pub async fn file_status(path: &Path, patch: &FilePatch) -> PatchResult<FileStatus> {
    let Some(data) = atomic::read_optional(path).await? else {
        return Ok(FileStatus::Missing);
    };

    Ok(if hash_matches(&patch.after_hash, &data) {
        FileStatus::Applied
    } else if hash_matches(&patch.before_hash, &data) {
        FileStatus::Original
    } else {
        FileStatus::Modified
    })
}

/// Compare every file of `record`, resolving paths against `base_dir`
pub async fn patch_status(base_dir: &Path, record: &PatchRecord) -> PatchResult<PatchStatus> {
    let mut files = BTreeMap::new();
    for (path, patch) in &record.files {
        let status = file_status(&base_dir.join(path), patch).await?;
        files.insert(path.clone(), status);
    }
    Ok(PatchStatus { files })
}
