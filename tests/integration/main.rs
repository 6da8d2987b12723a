//! Integration tests for socket-patch

mod engine_tests {
    use socket_patch::backup::{derive_backup_key, BackupEngine, MetadataIndex};
    use socket_patch::cache::{Algorithm, ContentCache, ContentStore, Integrity};
    use socket_patch::PatchError;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Env {
        home: TempDir,
        work: TempDir,
    }

    impl Env {
        fn new() -> Self {
            Self {
                home: TempDir::new().unwrap(),
                work: TempDir::new().unwrap(),
            }
        }

        fn cache_dir(&self) -> PathBuf {
            self.home.path().join("_cacache")
        }

        fn engine(&self) -> BackupEngine {
            BackupEngine::new(
                ContentCache::new(self.cache_dir()),
                MetadataIndex::new(self.home.path().join("_patches").join("manifests")),
            )
        }

        fn file(&self, name: &str, data: &[u8]) -> PathBuf {
            let path = self.work.path().join(name);
            std::fs::write(&path, data).unwrap();
            path
        }
    }

    #[tokio::test]
    async fn backup_restore_reproduces_bytes() {
        let env = Env::new();
        let engine = env.engine();
        let original: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
        let path = env.file("bundle.js", &original);
        let before = Integrity::compute(Algorithm::Sha256, &original);

        engine.backup("round-trip", &[path.clone()]).await.unwrap();
        std::fs::write(&path, b"patched contents").unwrap();
        engine.restore("round-trip").await.unwrap().into_result().unwrap();

        let restored = std::fs::read(&path).unwrap();
        assert_eq!(restored, original);
        assert_eq!(Integrity::compute(Algorithm::Sha256, &restored), before);
    }

    #[tokio::test]
    async fn backup_cleanup_scenario() {
        let env = Env::new();
        let engine = env.engine();
        let path = env.file("a.txt", b"hello");

        let saved = engine.backup("u1", &[path.clone()]).await.unwrap();
        assert_eq!(
            saved[0].integrity.to_string(),
            "sha256-LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ="
        );

        engine.cleanup("u1").await.unwrap();

        let err = engine.list_backups("u1").await.unwrap_err();
        assert!(matches!(err, PatchError::BackupNotFound(_)));
        let key = derive_backup_key("u1", path.to_str().unwrap());
        assert!(engine.cache().info(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tampered_blob_is_never_returned() {
        let env = Env::new();
        let engine = env.engine();
        let path = env.file("index.js", b"module.exports = 1;\n");
        engine.backup("tamper", &[path.clone()]).await.unwrap();

        let blob = ContentStore::new(env.cache_dir())
            .path_for(&Integrity::compute(Algorithm::Sha256, b"module.exports = 1;\n"));
        let mut bytes = std::fs::read(&blob).unwrap();
        bytes[0] ^= 0x01;
        std::fs::write(&blob, &bytes).unwrap();
        std::fs::write(&path, b"patched").unwrap();

        let report = engine.restore("tamper").await.unwrap();
        assert!(report.restored.is_empty());
        assert!(report.failed[0].1.is_integrity_mismatch());
        assert_eq!(std::fs::read(&path).unwrap(), b"patched");
    }

    /// Fill the cache index with `n` unrelated buckets
    fn populate_unrelated(cache_dir: &std::path::Path, n: usize) {
        for i in 0..n {
            let bucket = cache_dir
                .join("index-v5")
                .join(format!("{:02x}", i % 256))
                .join(format!("{:02x}", (i / 256) % 256))
                .join(format!("unrelated-{i}"));
            std::fs::create_dir_all(bucket.parent().unwrap()).unwrap();
            std::fs::write(&bucket, b"junk\n").unwrap();
        }
    }

    #[tokio::test]
    async fn list_backups_ignores_cache_size() {
        for n in [10, 10_000] {
            let env = Env::new();
            let engine = env.engine();
            let a = env.file("a.js", b"a");
            let b = env.file("b.js", b"b");
            engine.backup("scaled", &[a, b]).await.unwrap();
            populate_unrelated(&env.cache_dir(), n);

            assert_eq!(engine.list_backups("scaled").await.unwrap().len(), 2);

            // Listing must not touch the cache at all
            std::fs::remove_dir_all(env.cache_dir()).unwrap();
            assert_eq!(engine.list_backups("scaled").await.unwrap().len(), 2);
        }
    }
}

mod manifest_tests {
    use socket_patch::manifest::{ManifestStore, PatchRecord, Tier, WriteQueue};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(uuid: &str) -> PatchRecord {
        let mut record = PatchRecord::new("Fix", "MIT", Tier::Free)
            .with_file("lodash.js", "sha256-AAA", "sha256-BBB");
        record.uuid = uuid.to_string();
        record
    }

    #[tokio::test]
    async fn lodash_scenario() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path(), Arc::new(WriteQueue::new()));
        let id = "npm:lodash@4.17.20";

        store.add_patch(id, record("abc-123")).await.unwrap();
        assert!(store.has_patch(id).await.unwrap());
        assert!(store.remove_patch(id).await.unwrap());
        assert!(!store.remove_patch(id).await.unwrap());
    }

    #[tokio::test]
    async fn missing_manifest_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path(), Arc::new(WriteQueue::new()));

        let manifest = store.read().await.unwrap();
        assert_eq!(manifest.version, "1.0.0");
        assert!(manifest.patches.is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn repeated_add_keeps_one_entry() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path(), Arc::new(WriteQueue::new()));

        store.add_patch("npm:a@1", record("first")).await.unwrap();
        store.add_patch("npm:a@1", record("second")).await.unwrap();

        let patches = store.get_all_patches().await.unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches["npm:a@1"].uuid, "second");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutations_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(WriteQueue::new());
        // Separate store handles sharing one queue, as separate callers would
        let stores: Vec<ManifestStore> = (0..4)
            .map(|_| ManifestStore::new(dir.path(), queue.clone()))
            .collect();

        // Seed packages that the removals will target
        for i in 0..8 {
            stores[0]
                .add_patch(&format!("npm:old-{i}@1"), record(&format!("old-{i}")))
                .await
                .unwrap();
        }

        let mut handles = vec![];
        for i in 0..32 {
            let store = stores[i % stores.len()].clone();
            handles.push(tokio::spawn(async move {
                if i < 8 {
                    store.remove_patch(&format!("npm:old-{i}@1")).await.map(|_| ())
                } else {
                    store
                        .add_patch(&format!("npm:new-{i}@1"), record(&format!("new-{i}")))
                        .await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let patches = stores[0].get_all_patches().await.unwrap();
        assert_eq!(patches.len(), 24);
        assert!(patches.keys().all(|k| k.starts_with("npm:new-")));
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn socket_patch(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("socket-patch");
        cmd.env("SOCKET_HOME", home.path())
            .env("SOCKET_PATCH_CONFIG", home.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        socket_patch(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("back up, restore and track"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        socket_patch(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("socket-patch"));
    }

    #[test]
    fn backup_restore_cleanup() {
        let home = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let file = work.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();

        socket_patch(&home)
            .args(["backup", "cli-patch"])
            .arg(&file)
            .assert()
            .success()
            .stdout(predicate::str::contains("Backed up 1 file(s)"));

        std::fs::write(&file, "patched").unwrap();

        socket_patch(&home)
            .args(["restore", "cli-patch"])
            .assert()
            .success();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello");

        socket_patch(&home)
            .args(["list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cli-patch"));

        socket_patch(&home)
            .args(["cleanup", "cli-patch"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 backup(s)"));
    }

    #[test]
    fn restore_unknown_patch_fails() {
        let home = TempDir::new().unwrap();
        socket_patch(&home)
            .args(["restore", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No backup found"));
    }

    #[test]
    fn manifest_show_empty_project() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        socket_patch(&home)
            .arg("-C")
            .arg(project.path())
            .args(["manifest", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No patches in manifest"));
    }

    #[test]
    fn manifest_has_missing_fails() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        socket_patch(&home)
            .arg("-C")
            .arg(project.path())
            .args(["manifest", "has", "npm:lodash@4.17.20"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Patch not found"));
    }

    #[test]
    fn cache_verify_empty() {
        let home = TempDir::new().unwrap();
        socket_patch(&home)
            .args(["cache", "verify"])
            .assert()
            .success()
            .stdout(predicate::str::contains("0 entr(ies) verified"));
    }
}
