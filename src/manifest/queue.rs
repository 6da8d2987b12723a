//! Per-project write serialization for the manifest
//!
//! Manifest mutations are read-modify-write. Each project root gets its own
//! lane; operations on one lane run one at a time in the order they were
//! submitted. `tokio::sync::Mutex` hands out the lock in FIFO order and a
//! failed operation releases it like any other, so later operations always
//! run. Different roots never wait on each other.
//!
//! This only orders writers inside one process. Across processes the
//! manifest relies on atomic rename alone.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::trace;

/// Queue of manifest writers, one lane per project root
#[derive(Debug, Default)]
pub struct WriteQueue {
    lanes: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` once every earlier operation for `root` has finished
    pub async fn run<F, Fut, T>(&self, root: &Path, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lane = self.lane(root).await;
        let _turn = lane.lock().await;
        trace!("Manifest write lane acquired for {}", root.display());
        op().await
    }

    /// Number of project roots seen so far
    pub async fn lane_count(&self) -> usize {
        self.lanes.lock().await.len()
    }

    async fn lane(&self, root: &Path) -> Arc<Mutex<()>> {
        let key = lane_key(root).await;
        let mut lanes = self.lanes.lock().await;
        lanes.entry(key).or_default().clone()
    }
}

/// Equivalent spellings of a root share a lane, whether or not it exists yet.
///
/// The deepest existing ancestor is canonicalized and the missing tail is
/// appended, so the key does not change once the root is created.
async fn lane_key(root: &Path) -> PathBuf {
    let absolute = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());

    let mut existing = absolute.as_path();
    let mut missing = vec![];
    loop {
        if let Ok(canonical) = fs::canonicalize(existing).await {
            return missing
                .iter()
                .rev()
                .fold(canonical, |key, part| key.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[tokio::test]
    async fn operations_on_one_root_do_not_overlap() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(WriteQueue::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..16 {
            let queue = queue.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            let root = dir.path().to_path_buf();
            handles.push(tokio::spawn(async move {
                queue
                    .run(&root, || async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn runs_in_submission_order() {
        let dir = TempDir::new().unwrap();
        let queue = WriteQueue::new();
        let order = Mutex::new(vec![]);

        // Joined futures are first polled in order, so they queue in order
        let ops = (0..8).map(|i| {
            let order = &order;
            queue.run(dir.path(), move || async move {
                tokio::task::yield_now().await;
                order.lock().await.push(i);
            })
        });
        futures_util::future::join_all(ops).await;

        assert_eq!(*order.lock().await, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failure_does_not_block_later_operations() {
        let dir = TempDir::new().unwrap();
        let queue = WriteQueue::new();

        let first: Result<(), &str> = queue.run(dir.path(), || async { Err("boom") }).await;
        let second: Result<u32, &str> = queue.run(dir.path(), || async { Ok(7) }).await;

        assert!(first.is_err());
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn equivalent_paths_share_a_lane() {
        let dir = TempDir::new().unwrap();
        let queue = WriteQueue::new();
        let dotted = dir.path().join(".");

        queue.run(dir.path(), || async {}).await;
        queue.run(&dotted, || async {}).await;

        assert_eq!(queue.lane_count().await, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn root_keeps_its_lane_after_creation() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("link")).unwrap();
        let root = dir.path().join("link").join("proj");
        let queue = WriteQueue::new();

        queue.run(&root, || async {}).await;
        std::fs::create_dir(&root).unwrap();
        queue.run(&root, || async {}).await;
        queue.run(&real.join("proj"), || async {}).await;

        assert_eq!(queue.lane_count().await, 1);
    }
}
