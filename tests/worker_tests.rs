// Worker tests: cycle outcomes, failure isolation, shutdown flush, scheduled loop

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{HangingSource, ScriptedSource, at, batch, iface, manual_ticker};
use tempfile::TempDir;
use trafficmon::accounting::{Accountant, GroupBy};
use trafficmon::error::AccountingError;
use trafficmon::history_repo::{HistoryBackend, HistoryRepo};
use trafficmon::models::EntityKind;
use trafficmon::snapshot_store::SnapshotStore;
use trafficmon::worker::{
    CycleOutcome, Sinks, SummaryRx, WorkerConfig, WorkerDeps, run_cycle, spawn, summary_channel,
};

const CONFIG: WorkerConfig = WorkerConfig {
    source_timeout: Duration::from_millis(200),
    write_timeout: Duration::from_secs(5),
};

struct Fixture {
    _dir: TempDir,
    sinks: Sinks,
    summary_rx: SummaryRx,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let history_path = dir.path().join("history.jsonl");
    let history = HistoryRepo::open(HistoryBackend::Jsonl, history_path.to_str().unwrap())
        .await
        .unwrap();
    let snapshots = SnapshotStore::new(dir.path().join("snapshot.json")).unwrap();
    let (summary_tx, summary_rx) = summary_channel(None);
    Fixture {
        _dir: dir,
        sinks: Sinks {
            history: Arc::new(history),
            snapshots: Arc::new(snapshots),
            summary_tx,
        },
        summary_rx,
    }
}

fn accountant() -> Accountant {
    Accountant::new(EntityKind::Interfaces, GroupBy::Entity, 10)
}

#[tokio::test]
async fn test_run_cycle_persists_history_and_snapshot() {
    let fx = fixture().await;
    let mut source = ScriptedSource::new(vec![
        Ok(batch(0, vec![iface("ether1", 100, 50, 0)])),
        Ok(batch(60, vec![iface("ether1", 300, 80, 60)])),
    ]);
    let mut acc = accountant();

    let first = run_cycle(&mut source, &mut acc, &fx.sinks, &CONFIG).await;
    assert_eq!(
        first,
        CycleOutcome::Completed {
            entities: 1,
            history_rows: 0
        }
    );
    let second = run_cycle(&mut source, &mut acc, &fx.sinks, &CONFIG).await;
    assert_eq!(
        second,
        CycleOutcome::Completed {
            entities: 1,
            history_rows: 1
        }
    );

    let scan = fx.sinks.history.read_all().await.unwrap();
    assert_eq!(scan.records.len(), 1);
    assert_eq!(scan.records[0].total_bytes, 230);

    let saved = fx
        .sinks
        .snapshots
        .load(EntityKind::Interfaces)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.timestamp, at(60));
    assert_eq!(saved.cumulative.total(), 230);

    let published = fx.summary_rx.borrow().clone().unwrap();
    assert_eq!(published.as_ref(), &saved);
}

#[tokio::test]
async fn test_source_failure_leaves_state_untouched() {
    let fx = fixture().await;
    let mut source = ScriptedSource::new(vec![
        Ok(batch(0, vec![iface("ether1", 100, 100, 0)])),
        Err(AccountingError::SourceUnavailable("connection refused".into())),
        Ok(batch(120, vec![iface("ether1", 400, 100, 120)])),
    ]);
    let mut acc = accountant();

    run_cycle(&mut source, &mut acc, &fx.sinks, &CONFIG).await;
    let before = acc.state().entities();
    let outcome = run_cycle(&mut source, &mut acc, &fx.sinks, &CONFIG).await;
    assert_eq!(outcome, CycleOutcome::SourceFailed);
    assert_eq!(acc.state().entities(), before);

    // Next success spans the failed cycle.
    run_cycle(&mut source, &mut acc, &fx.sinks, &CONFIG).await;
    let report = acc.last_report().unwrap();
    assert_eq!(report.deltas[0].interval_tx, 300);
    assert_eq!(report.deltas[0].interval_start, at(0));
}

#[tokio::test]
async fn test_source_timeout_abandons_cycle() {
    let fx = fixture().await;
    let mut acc = accountant();
    let outcome = run_cycle(&mut HangingSource, &mut acc, &fx.sinks, &CONFIG).await;
    assert_eq!(outcome, CycleOutcome::SourceFailed);
    assert!(acc.state().is_empty());
    assert!(fx.summary_rx.borrow().is_none());
}

#[tokio::test]
async fn test_persistence_failure_keeps_in_memory_advance() {
    let dir = TempDir::new().unwrap();
    let history_path = dir.path().join("history.jsonl");
    let history = HistoryRepo::open(HistoryBackend::Jsonl, history_path.to_str().unwrap())
        .await
        .unwrap();
    // A directory where the snapshot file should go makes the rename fail.
    let snapshot_path = dir.path().join("snapshot.json");
    std::fs::create_dir_all(snapshot_path.join("blocker")).unwrap();
    let (summary_tx, _summary_rx) = summary_channel(None);
    let sinks = Sinks {
        history: Arc::new(history),
        snapshots: Arc::new(SnapshotStore::new(&snapshot_path).unwrap()),
        summary_tx,
    };

    let mut source = ScriptedSource::new(vec![
        Ok(batch(0, vec![iface("ether1", 0, 0, 0)])),
        Ok(batch(60, vec![iface("ether1", 10, 10, 60)])),
    ]);
    let mut acc = accountant();
    run_cycle(&mut source, &mut acc, &sinks, &CONFIG).await;
    let outcome = run_cycle(&mut source, &mut acc, &sinks, &CONFIG).await;

    assert_eq!(
        outcome,
        CycleOutcome::PersistFailed {
            history_written: true,
            snapshot_written: false
        }
    );
    assert_eq!(acc.state().totals().total(), 20);
    assert_eq!(sinks.history.read_all().await.unwrap().records.len(), 1);
}

#[tokio::test]
async fn test_spawned_worker_runs_on_tick_and_flushes_on_shutdown() {
    let mut fx = fixture().await;
    let source = ScriptedSource::new(vec![
        Ok(batch(0, vec![iface("ether1", 0, 0, 0)])),
        Ok(batch(60, vec![iface("ether1", 1000, 24, 60)])),
    ]);
    let (tick_tx, ticker) = manual_ticker();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let snapshots = fx.sinks.snapshots.clone();
    let history = fx.sinks.history.clone();

    let handle = spawn(
        WorkerDeps {
            source,
            ticker,
            accountant: accountant(),
            sinks: fx.sinks,
            shutdown_rx,
        },
        CONFIG,
    );

    for _ in 0..2 {
        tick_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), fx.summary_rx.changed())
            .await
            .expect("cycle published")
            .unwrap();
    }
    shutdown_tx.send(()).unwrap();
    let acc = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker stopped")
        .unwrap();

    assert_eq!(acc.state().totals().total(), 1024);
    let saved = snapshots.load(EntityKind::Interfaces).await.unwrap().unwrap();
    assert_eq!(saved.cumulative.total(), 1024);
    assert_eq!(history.read_all().await.unwrap().records.len(), 1);
}

#[tokio::test]
async fn test_shutdown_before_any_cycle_leaves_snapshot_alone() {
    let fx = fixture().await;
    let (_tick_tx, ticker) = manual_ticker();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let snapshots = fx.sinks.snapshots.clone();

    let handle = spawn(
        WorkerDeps {
            source: ScriptedSource::default(),
            ticker,
            accountant: accountant(),
            sinks: fx.sinks,
            shutdown_rx,
        },
        CONFIG,
    );
    shutdown_tx.send(()).unwrap();
    let acc = handle.await.unwrap();

    assert!(acc.state().is_empty());
    assert!(!snapshots.path().exists());
}
