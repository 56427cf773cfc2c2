// Snapshot store tests: atomic replace, restore, corrupt and mismatched documents

mod common;

use common::{at, batch, iface};
use tempfile::TempDir;
use trafficmon::accounting::{Accountant, GroupBy};
use trafficmon::error::AccountingError;
use trafficmon::models::{EntityKind, Snapshot};
use trafficmon::snapshot_store::SnapshotStore;

fn sample_snapshot() -> Snapshot {
    let mut acc = Accountant::new(EntityKind::Interfaces, GroupBy::Entity, 10);
    acc.process(batch(0, vec![iface("ether1", 0, 0, 0)]));
    acc.process(batch(60, vec![iface("ether1", 4096, 1024, 60)]));
    acc.snapshot(at(60))
}

#[tokio::test]
async fn test_save_then_load_returns_same_document() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path().join("state/snapshot.json")).unwrap();
    let snapshot = sample_snapshot();

    store.save(&snapshot).await.unwrap();
    let loaded = store.load(EntityKind::Interfaces).await.unwrap();
    assert_eq!(loaded, Some(snapshot));
}

#[tokio::test]
async fn test_save_replaces_previous_and_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path().join("snapshot.json")).unwrap();
    let first = sample_snapshot();
    store.save(&first).await.unwrap();

    let mut second = first.clone();
    second.timestamp = at(120);
    store.save(&second).await.unwrap();

    let loaded = store.load(EntityKind::Interfaces).await.unwrap().unwrap();
    assert_eq!(loaded.timestamp, at(120));
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["snapshot.json".to_string()]);
}

#[tokio::test]
async fn test_missing_snapshot_is_none() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path().join("snapshot.json")).unwrap();
    assert!(store.load(EntityKind::Interfaces).await.unwrap().is_none());
    assert!(store.load_or_empty(EntityKind::Interfaces).await.is_none());
}

#[tokio::test]
async fn test_corrupt_snapshot_reports_and_restores_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, b"{\"schemaVersion\":1,\"entityKi").unwrap();
    let store = SnapshotStore::new(&path).unwrap();

    let err = store.load(EntityKind::Interfaces).await.unwrap_err();
    assert!(matches!(err, AccountingError::CorruptSnapshot(_)));
    assert!(store.load_or_empty(EntityKind::Interfaces).await.is_none());
    // left in place for inspection
    assert!(path.exists());
}

#[tokio::test]
async fn test_snapshot_for_other_entity_kind_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path().join("snapshot.json")).unwrap();
    store.save(&sample_snapshot()).await.unwrap();

    let err = store.load(EntityKind::Connections).await.unwrap_err();
    assert!(matches!(err, AccountingError::CorruptSnapshot(_)));
    assert_eq!(err.kind(), "corrupt_snapshot");
}

#[tokio::test]
async fn test_unknown_schema_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path().join("snapshot.json")).unwrap();
    let mut snapshot = sample_snapshot();
    snapshot.schema_version = 99;
    store.save(&snapshot).await.unwrap();

    let err = store.load(EntityKind::Interfaces).await.unwrap_err();
    assert!(err.to_string().contains("schema version 99"));
}

#[tokio::test]
async fn test_restart_resumes_cumulative_from_snapshot() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path().join("snapshot.json")).unwrap();
    store.save(&sample_snapshot()).await.unwrap();

    let restored = store.load_or_empty(EntityKind::Interfaces).await.unwrap();
    let mut acc = Accountant::from_snapshot(restored, GroupBy::Entity, 10);
    assert_eq!(acc.state().totals().total(), 5120);

    // router rebooted while we were down
    let report = acc.process(batch(180, vec![iface("ether1", 10, 10, 180)]));
    assert_eq!(report.deltas[0].interval_total(), 0);
    assert_eq!(acc.state().totals().total(), 5120);

    acc.process(batch(240, vec![iface("ether1", 110, 10, 240)]));
    assert_eq!(acc.state().totals().total(), 5220);
}
