//! Guard behaviour over the file system store.

use std::sync::Arc;
use std::time::Duration;

use recall_guard::{
    FileSnapshotStore, FileState, GuardOptions, SnapshotGuard, SnapshotStore, Verification,
};
use tempfile::TempDir;

const FILES: &[&str] = &["SESSION-STATE.md", "knowledge/README.md"];

async fn setup(max_snapshots: usize) -> (TempDir, Arc<FileSnapshotStore>, SnapshotGuard) {
    let dir = TempDir::new().unwrap();
    let workspace = dir.path().join("workspace");
    std::fs::create_dir_all(workspace.join("knowledge")).unwrap();

    let store = Arc::new(FileSnapshotStore::new(dir.path().join("backups")).await.unwrap());
    let options = GuardOptions::new(&workspace, FILES.iter().map(|f| f.to_string()).collect())
        .with_cooldown(Duration::ZERO)
        .with_retention(max_snapshots, None)
        .with_quarantine_dir(dir.path().join("backups").join("quarantine"));
    let guard = SnapshotGuard::open(options, store.clone(), dir.path().join("guard-state.json"))
        .await
        .unwrap();
    (dir, store, guard)
}

#[tokio::test]
async fn test_retention_keeps_at_least_one_snapshot() {
    for max in [0, 1, 2, 5] {
        let (dir, store, guard) = setup(max).await;
        let path = dir.path().join("workspace/SESSION-STATE.md");
        for round in 0..8 {
            std::fs::write(&path, format!("state {round}")).unwrap();
            let report = guard.check(false).await.unwrap();
            assert_eq!(report.backed_up.len(), 1, "max {max} round {round}");

            let count = store.list("SESSION-STATE.md").await.unwrap().len();
            assert!(count >= 1);
            assert!(count <= max.max(1));
            // Sub-second backups must still get distinct names.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

#[tokio::test]
async fn test_corrupt_then_recover_round_trip() {
    let (dir, _store, guard) = setup(5).await;
    let readme = dir.path().join("workspace/knowledge/README.md");
    std::fs::write(&readme, "# Knowledge\n\nindex of notes").unwrap();
    guard.check(false).await.unwrap();

    std::fs::write(&readme, "").unwrap();
    let verification = guard.verify("knowledge/README.md", None).await.unwrap();
    assert!(matches!(verification, Verification::Corrupt { .. }));

    let outcomes = guard.recover().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].restored.is_some());
    assert_eq!(
        std::fs::read_to_string(&readme).unwrap(),
        "# Knowledge\n\nindex of notes"
    );
    assert_eq!(guard.record("knowledge/README.md").state, FileState::Clean);

    let quarantine = dir.path().join("backups").join("quarantine");
    assert_eq!(std::fs::read_dir(quarantine).unwrap().count(), 1);
}

#[tokio::test]
async fn test_missing_files_are_reported_not_failed() {
    let (_dir, _store, guard) = setup(5).await;
    let report = guard.check(true).await.unwrap();
    assert_eq!(report.missing.len(), 2);
    assert!(report.failed.is_empty());
}
