use super::*;
use chrono::Duration;
use tempfile::TempDir;

fn t(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_000) + Duration::seconds(secs)
}

async fn exercise(store: &dyn SnapshotStore) {
    let second = store.save("knowledge/INDEX.md", b"v2", t(10)).await.unwrap();
    let first = store.save("knowledge/INDEX.md", b"v1", t(5)).await.unwrap();
    store.save("MEMORY.md", b"other", t(7)).await.unwrap();

    let list = store.list("knowledge/INDEX.md").await.unwrap();
    assert_eq!(list, vec![first.clone(), second.clone()]);
    assert_eq!(first.content_hash, content_hash(b"v1"));
    assert_eq!(first.size, 2);

    assert_eq!(store.read(&second).await.unwrap(), b"v2");

    store.delete(&first).await.unwrap();
    assert_eq!(store.list("knowledge/INDEX.md").await.unwrap(), vec![second]);
    assert!(matches!(store.read(&first).await, Err(GuardError::NoSnapshot(_))));

    assert!(store.list("USER.md").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_memory_store() {
    exercise(&MemorySnapshotStore::new()).await;
}

#[tokio::test]
async fn test_file_store() {
    let dir = TempDir::new().unwrap();
    let store = FileSnapshotStore::new(dir.path().join("backups")).await.unwrap();
    exercise(&store).await;
}

#[tokio::test]
async fn test_file_store_layout() {
    let dir = TempDir::new().unwrap();
    let store = FileSnapshotStore::new(dir.path()).await.unwrap();
    let snap = store.save("knowledge/README.md", b"x", t(0)).await.unwrap();

    let expected = dir
        .path()
        .join("knowledge")
        .join("README.md")
        .join(snap.file_name());
    assert!(expected.exists());
}

#[tokio::test]
async fn test_file_store_ignores_foreign_files() {
    let dir = TempDir::new().unwrap();
    let store = FileSnapshotStore::new(dir.path()).await.unwrap();
    store.save("SOUL.md", b"soul", t(0)).await.unwrap();
    std::fs::write(dir.path().join("SOUL.md").join("notes.txt"), "x").unwrap();
    std::fs::write(dir.path().join("SOUL.md").join("broken.bak"), "x").unwrap();

    assert_eq!(store.list("SOUL.md").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_missing_is_ok() {
    let dir = TempDir::new().unwrap();
    let store = FileSnapshotStore::new(dir.path()).await.unwrap();
    let snap = Snapshot {
        file: "USER.md".to_string(),
        taken_at: t(0),
        content_hash: "00".to_string(),
        size: 0,
    };
    store.delete(&snap).await.unwrap();
}

#[tokio::test]
async fn test_memory_tamper_keeps_recorded_hash() {
    let store = MemorySnapshotStore::new();
    let snap = store.save("USER.md", b"good", t(0)).await.unwrap();
    store.tamper(&snap, b"bad".to_vec()).await;

    assert_eq!(store.read(&snap).await.unwrap(), b"bad");
    assert_eq!(store.list("USER.md").await.unwrap()[0].content_hash, content_hash(b"good"));
}
