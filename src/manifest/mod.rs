//! Committed patch manifest
//!
//! A single pretty-printed JSON file per project recording which patches
//! are applied. Every mutation goes through the [`WriteQueue`] lane for the
//! project root and every write is an atomic rename.

pub mod queue;
pub mod schema;
pub mod status;

pub use queue::WriteQueue;
pub use schema::{FilePatch, PatchManifest, PatchRecord, Severity, Tier, Vulnerability};
pub use status::{FileStatus, PatchStatus};

use crate::atomic;
use crate::error::{PatchError, PatchResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Manifest location relative to the project root
pub const DEFAULT_MANIFEST_PATH: &str = ".socket/manifest.json";

/// Manifest store for one project root
#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: PathBuf,
    path: PathBuf,
    queue: Arc<WriteQueue>,
}

impl ManifestStore {
    /// Store for `root` at the default manifest location
    pub fn new(root: impl Into<PathBuf>, queue: Arc<WriteQueue>) -> Self {
        Self::with_relative_path(root, DEFAULT_MANIFEST_PATH, queue)
    }

    /// Store for `root` with the manifest at `root/relative`
    pub fn with_relative_path(
        root: impl Into<PathBuf>,
        relative: impl AsRef<Path>,
        queue: Arc<WriteQueue>,
    ) -> Self {
        let root = root.into();
        Self {
            path: root.join(relative),
            root,
            queue,
        }
    }

    /// Manifest file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the manifest. A missing file is an empty manifest.
    ///
    /// The document must pass the same validation as [`Self::write`].
    pub async fn read(&self) -> PatchResult<PatchManifest> {
        let Some(bytes) = atomic::read_optional(&self.path).await? else {
            debug!("No manifest at {}, using empty manifest", self.path.display());
            return Ok(PatchManifest::default());
        };

        let manifest: PatchManifest =
            serde_json::from_slice(&bytes).map_err(|e| self.invalid(e.to_string()))?;
        manifest.validate().map_err(|reason| self.invalid(reason))?;
        Ok(manifest)
    }

    fn invalid(&self, reason: String) -> PatchError {
        PatchError::ManifestInvalid {
            path: self.path.clone(),
            reason,
        }
    }

    /// Read the manifest, falling back to an empty one on any error
    pub async fn read_or_default(&self) -> PatchManifest {
        match self.read().await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Ignoring unreadable manifest {}: {}", self.path.display(), e);
                PatchManifest::default()
            }
        }
    }

    /// Validate and write `manifest`, replacing the file
    pub async fn write(&self, manifest: &PatchManifest) -> PatchResult<()> {
        self.queue
            .run(&self.root, || self.write_now(manifest))
            .await
    }

    /// Insert or fully replace the patch for `package_id`
    pub async fn add_patch(&self, package_id: &str, record: PatchRecord) -> PatchResult<()> {
        self.queue
            .run(&self.root, || async {
                let mut manifest = self.read().await?;
                let replaced = manifest
                    .patches
                    .insert(package_id.to_string(), record)
                    .is_some();
                self.write_now(&manifest).await?;

                if replaced {
                    info!("Replaced patch for {}", package_id);
                } else {
                    info!("Added patch for {}", package_id);
                }
                Ok(())
            })
            .await
    }

    /// Remove the patch for `package_id`, returning whether it existed
    pub async fn remove_patch(&self, package_id: &str) -> PatchResult<bool> {
        self.queue
            .run(&self.root, || async {
                let mut manifest = self.read().await?;
                if manifest.patches.remove(package_id).is_none() {
                    debug!("No patch for {} to remove", package_id);
                    return Ok(false);
                }
                self.write_now(&manifest).await?;
                info!("Removed patch for {}", package_id);
                Ok(true)
            })
            .await
    }

    /// The patch for `package_id`, if any
    pub async fn get_patch(&self, package_id: &str) -> PatchResult<Option<PatchRecord>> {
        Ok(self.read().await?.patches.remove(package_id))
    }

    /// Package identifiers with a patch, sorted
    pub async fn list_patches(&self) -> PatchResult<Vec<String>> {
        Ok(self.read().await?.patches.into_keys().collect())
    }

    pub async fn has_patch(&self, package_id: &str) -> PatchResult<bool> {
        Ok(self.read().await?.patches.contains_key(package_id))
    }

    pub async fn get_all_patches(&self) -> PatchResult<BTreeMap<String, PatchRecord>> {
        Ok(self.read().await?.patches)
    }

    /// Write without taking the queue; callers must already hold the lane
    async fn write_now(&self, manifest: &PatchManifest) -> PatchResult<()> {
        manifest.validate().map_err(|reason| self.invalid(reason))?;

        let mut content = serde_json::to_string_pretty(manifest)?;
        content.push('\n');
        atomic::write_atomic(&self.path, content.as_bytes(), None).await?;

        debug!(
            "Wrote manifest {} ({} patches)",
            self.path.display(),
            manifest.patches.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::fs;

    fn store() -> (ManifestStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path(), Arc::new(WriteQueue::new()));
        (store, dir)
    }

    fn record(uuid: &str) -> PatchRecord {
        let mut record = PatchRecord::new("Fix prototype pollution", "MIT", Tier::Free)
            .with_file("lodash.js", "sha256-AAA", "sha256-BBB");
        record.uuid = uuid.to_string();
        record
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let (store, _dir) = store();
        let manifest = store.read().await.unwrap();
        assert_eq!(manifest.version, "1.0.0");
        assert!(manifest.patches.is_empty());
    }

    #[tokio::test]
    async fn add_has_remove() {
        let (store, _dir) = store();
        let id = "npm:lodash@4.17.20";

        store.add_patch(id, record("abc-123")).await.unwrap();
        assert!(store.has_patch(id).await.unwrap());
        assert_eq!(store.get_patch(id).await.unwrap().unwrap().uuid, "abc-123");

        assert!(store.remove_patch(id).await.unwrap());
        assert!(!store.remove_patch(id).await.unwrap());
        assert!(!store.has_patch(id).await.unwrap());
    }

    #[tokio::test]
    async fn add_replaces_existing_record() {
        let (store, _dir) = store();
        store.add_patch("npm:a@1", record("first")).await.unwrap();
        store.add_patch("npm:a@1", record("second")).await.unwrap();

        let all = store.get_all_patches().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["npm:a@1"].uuid, "second");
    }

    #[tokio::test]
    async fn file_is_pretty_with_trailing_newline() {
        let (store, _dir) = store();
        store.add_patch("npm:a@1", record("u1")).await.unwrap();

        let raw = fs::read_to_string(store.path()).await.unwrap();
        assert!(raw.starts_with("{\n  \"version\": \"1.0.0\""));
        assert!(raw.ends_with("}\n"));
        assert!(raw.contains("\"beforeHash\": \"sha256-AAA\""));
    }

    #[tokio::test]
    async fn invalid_json_fails_read() {
        let (store, _dir) = store();
        fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        fs::write(store.path(), b"{ broken").await.unwrap();

        let err = store.read().await.unwrap_err();
        assert!(matches!(err, PatchError::ManifestInvalid { .. }));
        assert!(store.read_or_default().await.patches.is_empty());

        // mutations refuse to clobber an unreadable manifest
        assert!(store.add_patch("npm:a@1", record("u1")).await.is_err());
    }

    #[tokio::test]
    async fn read_rejects_what_write_would_refuse() {
        let (store, _dir) = store();
        fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        let bad = r#"{"version": "1.0.0", "patches": {"npm:a@1": {
            "uuid": "u1",
            "exportedAt": "2024-05-01T12:00:00Z",
            "files": {"x.js": {"beforeHash": "sha1-AAA", "afterHash": "sha256-BBB"}},
            "description": "d", "license": "MIT", "tier": "free"
        }}}"#;
        fs::write(store.path(), bad).await.unwrap();

        let err = store.read().await.unwrap_err();
        assert!(matches!(err, PatchError::ManifestInvalid { .. }));
        assert!(err.to_string().contains("beforeHash"));
        assert!(store.read_or_default().await.patches.is_empty());

        let err = store.add_patch("npm:b@1", record("u2")).await.unwrap_err();
        assert!(matches!(err, PatchError::ManifestInvalid { .. }));
        assert_eq!(fs::read_to_string(store.path()).await.unwrap(), bad);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_root_uses_one_lane() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).await.unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("link")).unwrap();
        let queue = Arc::new(WriteQueue::new());
        let store = ManifestStore::new(dir.path().join("link").join("proj"), queue.clone());

        store.add_patch("npm:a@1", record("u1")).await.unwrap();
        store.add_patch("npm:b@1", record("u2")).await.unwrap();

        assert_eq!(queue.lane_count().await, 1);
        assert_eq!(store.list_patches().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn write_validates() {
        let (store, _dir) = store();
        let mut manifest = PatchManifest::default();
        manifest.patches.insert("npm:a@1".to_string(), record("bad/uuid"));

        let err = store.write(&manifest).await.unwrap_err();
        assert!(matches!(err, PatchError::ManifestInvalid { .. }));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn list_patches_sorted() {
        let (store, _dir) = store();
        store.add_patch("npm:b@1", record("u2")).await.unwrap();
        store.add_patch("npm:a@1", record("u1")).await.unwrap();

        assert_eq!(store.list_patches().await.unwrap(), vec!["npm:a@1", "npm:b@1"]);
    }

    #[tokio::test]
    async fn version_defaults_when_absent() {
        let (store, _dir) = store();
        fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        fs::write(store.path(), br#"{"patches": {}}"#).await.unwrap();

        assert_eq!(store.read().await.unwrap().version, "1.0.0");
    }
}
