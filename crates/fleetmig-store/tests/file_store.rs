//! FileStore Tests
//!
//! Persistence, journaling and recovery of the JSON snapshot store.
//!
use fleetmig_store::{
    Document, DocumentStore, FileStore, Operation, Snapshot, StoreError, Update,
};
use pretty_assertions::assert_eq;

fn seed() -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot
        .put("units", Document::with_id("u1").with("service", "db"))
        .unwrap();
    snapshot
        .put("units", Document::with_id("u2").with("service", "web"))
        .unwrap();
    snapshot
}

#[tokio::test]
async fn test_applied_transactions_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let store = FileStore::create(&path, seed()).await.unwrap();
    store
        .apply_transaction(&[Operation::update(
            "units",
            "u1",
            Update::new().set("application", "db").unset("service"),
        )])
        .await
        .unwrap();
    drop(store);

    let reopened = FileStore::open(&path).await.unwrap();
    let u1 = reopened.find_by_id("units", "u1").await.unwrap();
    assert_eq!(u1, Document::with_id("u1").with("application", "db"));
    assert!(reopened.snapshot().await.pending.is_empty());
}

#[tokio::test]
async fn test_failed_transaction_is_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let store = FileStore::create(&path, seed()).await.unwrap();
    let err = store
        .apply_transaction(&[
            Operation::remove("units", "u1"),
            Operation::remove("units", "u9"),
        ])
        .await
        .unwrap_err();
    assert!(err.is_precondition_failure());
    drop(store);

    let reopened = FileStore::open(&path).await.unwrap();
    assert_eq!(reopened.snapshot().await, seed());
}

#[tokio::test]
async fn test_journaled_transaction_is_resumed_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let store = FileStore::create(&path, seed()).await.unwrap();
    store
        .stage_pending(vec![Operation::remove("units", "u2")])
        .await
        .unwrap();
    drop(store);

    let reopened = FileStore::open(&path).await.unwrap();
    assert_eq!(reopened.count("units").await.unwrap(), 2);

    reopened.resume_pending_transactions().await.unwrap();
    assert_eq!(reopened.count("units").await.unwrap(), 1);
    drop(reopened);

    let again = FileStore::open(&path).await.unwrap();
    assert!(again.snapshot().await.pending.is_empty());
    assert_eq!(again.count("units").await.unwrap(), 1);
}

#[tokio::test]
async fn test_drop_collection_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let store = FileStore::create(&path, seed()).await.unwrap();
    store.drop_collection("units").await.unwrap();
    drop(store);

    let reopened = FileStore::open(&path).await.unwrap();
    assert!(reopened.list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_snapshot_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = FileStore::open(dir.path().join("absent.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }));
}

#[tokio::test]
async fn test_corrupt_snapshot_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let err = FileStore::open(&path).await.unwrap_err();
    assert!(matches!(err, StoreError::Snapshot(_)));
}
