//! Crash-safe file writes
//!
//! Every on-disk mutation goes through a temp file that is fsynced and then
//! renamed over the destination, so readers observe either the old or the
//! new contents and never a partial write.

use crate::error::{PatchError, PatchResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Write `contents` to `path` atomically.
///
/// The temp file is staged in `staging_dir` when given, otherwise next to
/// the destination. The staging directory must live on the same filesystem
/// as `path` for the rename to be atomic.
pub async fn write_atomic(
    path: &Path,
    contents: &[u8],
    staging_dir: Option<&Path>,
) -> PatchResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| PatchError::Internal(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|e| PatchError::io(format!("creating directory {}", parent.display()), e))?;

    let staging = staging_dir.unwrap_or(parent);
    fs::create_dir_all(staging)
        .await
        .map_err(|e| PatchError::io(format!("creating directory {}", staging.display()), e))?;

    let tmp_path = temp_path(staging, path);
    if let Err(e) = write_and_sync(&tmp_path, contents).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(PatchError::io(
            format!("renaming {} to {}", tmp_path.display(), path.display()),
            e,
        ));
    }

    Ok(())
}

/// Remove a file, treating "already gone" as success.
///
/// Returns whether a file was actually removed.
pub async fn remove_if_exists(path: &Path) -> PatchResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PatchError::io(format!("removing {}", path.display()), e)),
    }
}

/// Read a file, mapping "not found" to `None`.
pub async fn read_optional(path: &Path) -> PatchResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PatchError::io(format!("reading {}", path.display()), e)),
    }
}

async fn write_and_sync(tmp_path: &Path, contents: &[u8]) -> PatchResult<()> {
    let mut file = fs::File::create(tmp_path)
        .await
        .map_err(|e| PatchError::io(format!("creating {}", tmp_path.display()), e))?;
    file.write_all(contents)
        .await
        .map_err(|e| PatchError::io(format!("writing {}", tmp_path.display()), e))?;
    file.sync_all()
        .await
        .map_err(|e| PatchError::io(format!("syncing {}", tmp_path.display()), e))?;
    Ok(())
}

fn temp_path(staging: &Path, dest: &Path) -> PathBuf {
    let stem = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    staging.join(format!(".{}.{}.tmp", stem, Uuid::new_v4().simple()))
}
