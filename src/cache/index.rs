//! Hash-bucketed key index
//!
//! Each key maps to a bucket file at `index-v5/<b1>/<b2>/<rest>` where
//! `b1b2rest` is the sha256 hex of the key. The key's literal text never
//! reaches the filesystem, which keeps arbitrary key strings safe and spreads
//! entries across many small directories. The price is that listing keys by
//! prefix requires walking every bucket.
//!
//! A bucket line is `<sha256 hex of json>\t<json>`. Lines whose checksum does
//! not match are skipped as corrupt.

use crate::atomic;
use crate::cache::content::TMP_DIR;
use crate::cache::integrity::Integrity;
use crate::error::{PatchError, PatchResult};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{trace, warn};

/// Index directory name under the cache root
pub const INDEX_DIR: &str = "index-v5";

/// One stored key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Opaque caller key, e.g. `backup:<uuid>:<pathHash>`
    pub key: String,

    /// Hash of the stored content
    pub integrity: Integrity,

    /// Creation time in milliseconds since the Unix epoch
    pub time: i64,

    /// Content size in bytes
    pub size: u64,

    /// Free-form caller metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Sha256 hex of `data`
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Bucketed key index
#[derive(Debug, Clone)]
pub struct CacheIndex {
    root: PathBuf,
}

impl CacheIndex {
    /// Create an index rooted at the cache directory
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: cache_dir.into(),
        }
    }

    /// Bucket file for `key`
    pub fn bucket_path(&self, key: &str) -> PathBuf {
        let hashed = sha256_hex(key.as_bytes());
        self.root
            .join(INDEX_DIR)
            .join(&hashed[0..2])
            .join(&hashed[2..4])
            .join(&hashed[4..])
    }

    /// Write or overwrite the entry for `entry.key`
    pub async fn insert(&self, entry: &CacheEntry) -> PatchResult<()> {
        validate_key(&entry.key)?;
        let json = serde_json::to_string(entry)?;
        let line = format!("{}\t{}\n", sha256_hex(json.as_bytes()), json);

        let path = self.bucket_path(&entry.key);
        atomic::write_atomic(&path, line.as_bytes(), Some(&self.root.join(TMP_DIR))).await?;
        trace!("Indexed {} -> {}", entry.key, entry.integrity);
        Ok(())
    }

    /// Look up the entry for `key`
    pub async fn find(&self, key: &str) -> PatchResult<Option<CacheEntry>> {
        validate_key(key)?;
        let path = self.bucket_path(key);
        let Some(bytes) = atomic::read_optional(&path).await? else {
            return Ok(None);
        };

        Ok(parse_bucket(&path, &bytes)
            .into_iter()
            .rev()
            .find(|entry| entry.key == key))
    }

    /// Delete the entry for `key`, returning whether one existed
    pub async fn delete(&self, key: &str) -> PatchResult<bool> {
        validate_key(key)?;
        atomic::remove_if_exists(&self.bucket_path(key)).await
    }

    /// Walk every bucket, yielding entries lazily.
    ///
    /// Cost is proportional to the total number of entries in the cache.
    /// Each call starts a fresh walk.
    pub fn entries(&self) -> impl Stream<Item = PatchResult<CacheEntry>> + Send + 'static {
        let walk = Walk {
            stack: vec![self.root.join(INDEX_DIR)],
            ready: VecDeque::new(),
        };

        stream::unfold(walk, |mut walk| async move {
            loop {
                if let Some(entry) = walk.ready.pop_front() {
                    return Some((Ok(entry), walk));
                }

                let path = walk.stack.pop()?;
                let meta = match fs::symlink_metadata(&path).await {
                    Ok(meta) => meta,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        let err = PatchError::io(format!("inspecting {}", path.display()), e);
                        return Some((Err(err), walk));
                    }
                };

                let step = if meta.is_dir() {
                    read_children(&path).await.map(|children| walk.stack.extend(children))
                } else {
                    match atomic::read_optional(&path).await {
                        Ok(Some(bytes)) => {
                            walk.ready.extend(parse_bucket(&path, &bytes));
                            Ok(())
                        }
                        Ok(None) => Ok(()),
                        Err(e) => Err(e),
                    }
                };

                if let Err(e) = step {
                    return Some((Err(e), walk));
                }
            }
        })
    }
}

struct Walk {
    stack: Vec<PathBuf>,
    ready: VecDeque<CacheEntry>,
}

/// Keys must be non-empty and free of line breaks
pub fn validate_key(key: &str) -> PatchResult<()> {
    if key.is_empty() {
        return Err(PatchError::InvalidKey {
            key: key.to_string(),
            reason: "key is empty".to_string(),
        });
    }
    if key.contains(['\n', '\r']) {
        return Err(PatchError::InvalidKey {
            key: key.to_string(),
            reason: "key contains a line break".to_string(),
        });
    }
    Ok(())
}

async fn read_children(dir: &Path) -> PatchResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| PatchError::io(format!("reading index directory {}", dir.display()), e))?;

    let mut children = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PatchError::io("reading index entry", e))?
    {
        children.push(entry.path());
    }

    // Popped from the back, so reverse order yields a sorted walk
    children.sort();
    children.reverse();
    Ok(children)
}

fn parse_bucket(path: &Path, bytes: &[u8]) -> Vec<CacheEntry> {
    let content = String::from_utf8_lossy(bytes);
    let mut entries = vec![];

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let Some((checksum, json)) = line.split_once('\t') else {
            warn!("Skipping malformed index line in {}", path.display());
            continue;
        };
        if sha256_hex(json.as_bytes()) != checksum {
            warn!("Skipping index line with bad checksum in {}", path.display());
            continue;
        }
        match serde_json::from_str::<CacheEntry>(json) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping unparseable index line in {}: {}", path.display(), e),
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::integrity::Algorithm;
    use futures_util::TryStreamExt;
    use tempfile::TempDir;

    fn entry(key: &str, data: &[u8]) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            integrity: Integrity::compute(Algorithm::Sha256, data),
            time: 1_700_000_000_000,
            size: data.len() as u64,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn bucket_path_does_not_contain_key_text() {
        let index = CacheIndex::new("/cache");
        let path = index.bucket_path("backup:../../etc/passwd");
        let rel = path.strip_prefix("/cache/index-v5").unwrap();

        assert_eq!(rel.components().count(), 3);
        assert!(!path.to_string_lossy().contains("passwd"));
    }

    #[tokio::test]
    async fn insert_find_delete() {
        let dir = TempDir::new().unwrap();
        let index = CacheIndex::new(dir.path());
        let e = entry("backup:u1:abc", b"hello");

        index.insert(&e).await.unwrap();
        assert_eq!(index.find("backup:u1:abc").await.unwrap(), Some(e));

        assert!(index.delete("backup:u1:abc").await.unwrap());
        assert!(index.find("backup:u1:abc").await.unwrap().is_none());
        assert!(!index.delete("backup:u1:abc").await.unwrap());
    }

    #[tokio::test]
    async fn insert_overwrites() {
        let dir = TempDir::new().unwrap();
        let index = CacheIndex::new(dir.path());

        index.insert(&entry("k", b"one")).await.unwrap();
        index.insert(&entry("k", b"two")).await.unwrap();

        let found = index.find("k").await.unwrap().unwrap();
        assert_eq!(found.integrity, Integrity::compute(Algorithm::Sha256, b"two"));
    }

    #[tokio::test]
    async fn tampered_line_is_ignored() {
        let dir = TempDir::new().unwrap();
        let index = CacheIndex::new(dir.path());
        index.insert(&entry("k", b"one")).await.unwrap();

        let path = index.bucket_path("k");
        let content = fs::read_to_string(&path).await.unwrap();
        fs::write(&path, content.replace("\"size\":3", "\"size\":4"))
            .await
            .unwrap();

        assert!(index.find("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn entries_walks_all_buckets() {
        let dir = TempDir::new().unwrap();
        let index = CacheIndex::new(dir.path());
        for i in 0..5 {
            index
                .insert(&entry(&format!("key-{i}"), format!("v{i}").as_bytes()))
                .await
                .unwrap();
        }

        let mut keys: Vec<String> = index
            .entries()
            .map_ok(|e| e.key)
            .try_collect()
            .await
            .unwrap();
        keys.sort();
        assert_eq!(keys, vec!["key-0", "key-1", "key-2", "key-3", "key-4"]);

        // restartable
        let again: Vec<CacheEntry> = index.entries().try_collect().await.unwrap();
        assert_eq!(again.len(), 5);
    }

    #[tokio::test]
    async fn entries_on_empty_cache() {
        let dir = TempDir::new().unwrap();
        let index = CacheIndex::new(dir.path().join("missing"));
        let all: Vec<CacheEntry> = index.entries().try_collect().await.unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("a\nb").is_err());
        assert!(validate_key("download:123").is_ok());
    }
}
