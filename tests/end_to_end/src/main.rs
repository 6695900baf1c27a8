fn main() {
    println!("Run `cargo test -p end-to-end` to execute end-to-end transfer tests.");
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use bulkferry_engine::{
        Direction, FileRef, ObjectStore, OverallStatus, TaskStatus, TransferConfig,
        TransferManager, TransferManagerState,
    };
    use bulkferry_local_store::LocalStore;
    use tokio::sync::mpsc;

    /// Small thresholds so multipart paths run on tiny files.
    fn config() -> TransferConfig {
        TransferConfig {
            max_concurrent_uploads: 2,
            max_concurrent_downloads: 2,
            multipart_threshold: 64 * 1024,
            chunk_size: 16 * 1024,
            ..TransferConfig::default()
        }
    }

    /// Deterministic file contents that differ per file and per offset.
    fn contents(seed: u8, len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    /// Submits a batch and waits for its completion callback.
    async fn run_batch(
        manager: &TransferManager,
        files: Vec<FileRef>,
        path: &str,
    ) -> TransferManagerState {
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.on_complete(move |state| {
            let _ = tx.send(state.clone());
        });
        manager.submit(files, path).unwrap();
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("batch did not finish in time")
            .expect("manager dropped the callback")
    }

    async fn write_sources(dir: &Path, specs: &[(&str, u8, usize)]) -> Vec<FileRef> {
        let mut files = Vec::new();
        for &(name, seed, len) in specs {
            let path = dir.join(name);
            std::fs::write(&path, contents(seed, len)).unwrap();
            files.push(FileRef::open(&path).await.unwrap());
        }
        files
    }

    #[tokio::test]
    async fn upload_then_download_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let out = tmp.path().join("out");
        std::fs::create_dir_all(&src).unwrap();
        let store = Arc::new(LocalStore::open(tmp.path().join("bucket")).await.unwrap());

        let specs = [
            ("small.txt", 1, 100),
            ("medium.bin", 2, 40 * 1024),
            ("large.bin", 3, 200 * 1024 + 7),
            ("exact.bin", 4, 64 * 1024),
        ];
        let files = write_sources(&src, &specs).await;

        let uploads = TransferManager::new(Direction::Upload, config(), store.clone()).unwrap();
        let state = run_batch(&uploads, files, "/backup/2024").await;

        assert_eq!(state.overall_status, OverallStatus::Completed);
        assert_eq!(state.completed_files, 4);
        assert_eq!(state.overall_progress, 100.0);
        let chunked: Vec<_> = state
            .tasks
            .iter()
            .filter(|t| t.strategy.is_chunked())
            .map(|t| t.file.name.as_str())
            .collect();
        assert_eq!(chunked, vec!["large.bin", "exact.bin"]);

        for &(name, seed, len) in &specs {
            let stored = std::fs::read(store.root().join("backup/2024").join(name)).unwrap();
            assert_eq!(stored, contents(seed, len), "{name} differs after upload");
        }

        let listing = store.list_files("/backup/2024").await.unwrap();
        assert_eq!(listing.len(), 4);

        let targets = listing
            .iter()
            .map(|e| FileRef::download_target(e.name.clone(), e.size, out.join(&e.name)))
            .collect();
        let downloads = TransferManager::new(Direction::Download, config(), store.clone()).unwrap();
        let state = run_batch(&downloads, targets, "backup/2024").await;

        assert_eq!(state.overall_status, OverallStatus::Completed);
        assert!(state.tasks.iter().all(|t| !t.strategy.is_chunked()));
        for &(name, seed, len) in &specs {
            let downloaded = std::fs::read(out.join(name)).unwrap();
            assert_eq!(downloaded, contents(seed, len), "{name} differs after download");
        }
    }

    #[tokio::test]
    async fn missing_object_fails_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open(tmp.path().join("bucket")).await.unwrap());
        std::fs::write(store.root().join("present.txt"), b"here").unwrap();

        let out = tmp.path().join("out");
        let targets = vec![
            FileRef::download_target("present.txt", 4, out.join("present.txt")),
            FileRef::download_target("absent.txt", 4, out.join("absent.txt")),
        ];
        let manager = TransferManager::new(Direction::Download, config(), store).unwrap();
        let state = run_batch(&manager, targets, "/").await;

        assert_eq!(state.overall_status, OverallStatus::Error);
        assert_eq!(state.completed_files, 1);
        assert_eq!(state.failed_files, 1);
        let failed = state.tasks.iter().find(|t| t.status == TaskStatus::Error).unwrap();
        assert_eq!(failed.file.name, "absent.txt");
        assert_eq!(failed.error.as_deref(), Some("not found: absent.txt"));
        assert_eq!(std::fs::read(out.join("present.txt")).unwrap(), b"here");

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["overall_status"], "error");
        assert_eq!(json["tasks"][1]["status"], "error");
    }

    #[tokio::test]
    async fn retry_after_fixing_the_cause() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open(tmp.path().join("bucket")).await.unwrap());
        let out = tmp.path().join("out");

        let manager = TransferManager::new(Direction::Download, config(), store.clone()).unwrap();
        let state = run_batch(
            &manager,
            vec![FileRef::download_target("late.txt", 5, out.join("late.txt"))],
            "/",
        )
        .await;
        let id = state.tasks[0].id;
        assert_eq!(state.tasks[0].status, TaskStatus::Error);

        std::fs::write(store.root().join("late.txt"), b"ready").unwrap();
        assert!(manager.retry(id).unwrap());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
        while manager.task(id).unwrap().status != TaskStatus::Completed {
            assert!(tokio::time::Instant::now() < deadline, "retry did not finish");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(std::fs::read(out.join("late.txt")).unwrap(), b"ready");
        assert_eq!(manager.snapshot().overall_status, OverallStatus::Completed);
    }
}
