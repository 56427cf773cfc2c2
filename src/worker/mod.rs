// Accounting worker: Idle -> Sampling -> Computing -> Persisting -> Idle, once per tick,
// until shutdown. One cycle always runs to completion before the next wait; the wait is
// the only place shutdown is observed.

mod ticker;

pub use ticker::{CronTicker, IntervalTicker, Schedule, Ticker};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::accounting::{Accountant, CycleReport};
use crate::error::{AccountingError, Result};
use crate::history_repo::HistoryRepo;
use crate::models::{Snapshot, gib};
use crate::snapshot_store::SnapshotStore;
use crate::source::CounterSource;

/// Latest published snapshot, `None` until the first cycle (or restore).
pub type SummaryTx = watch::Sender<Option<Arc<Snapshot>>>;
pub type SummaryRx = watch::Receiver<Option<Arc<Snapshot>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    Computing,
    Persisting,
}

/// What one cycle achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed {
        entities: usize,
        history_rows: usize,
    },
    /// Nothing was mutated; retried on the next tick.
    SourceFailed,
    /// State advanced in memory; at least one durable write was lost.
    PersistFailed {
        history_written: bool,
        snapshot_written: bool,
    },
}

/// Where cycle results go.
pub struct Sinks {
    pub history: Arc<HistoryRepo>,
    pub snapshots: Arc<SnapshotStore>,
    pub summary_tx: SummaryTx,
}

pub struct WorkerDeps<S, T> {
    pub source: S,
    pub ticker: T,
    pub accountant: Accountant,
    pub sinks: Sinks,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Bounds on the two blocking steps, so a hung router or disk cannot wedge the loop.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub source_timeout: Duration,
    pub write_timeout: Duration,
}

/// Spawn the worker. The handle yields the final accountant after shutdown.
pub fn spawn<S, T>(
    deps: WorkerDeps<S, T>,
    config: WorkerConfig,
) -> tokio::task::JoinHandle<Accountant>
where
    S: CounterSource + 'static,
    T: Ticker + 'static,
{
    let WorkerDeps {
        mut source,
        mut ticker,
        mut accountant,
        sinks,
        mut shutdown_rx,
    } = deps;

    tokio::spawn(async move {
        let mut cycles_completed: u64 = 0;
        let mut cycles_failed: u64 = 0;

        loop {
            debug!(phase = ?Phase::Idle, "waiting for next cycle");
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    debug!("Worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match run_cycle(&mut source, &mut accountant, &sinks, &config).await {
                        CycleOutcome::Completed { .. } => cycles_completed += 1,
                        _ => cycles_failed += 1,
                    }
                }
            }
        }

        flush_on_shutdown(&accountant, &sinks, &config).await;
        info!(cycles_completed, cycles_failed, "Worker stopped");
        accountant
    })
}

/// One full cycle. A source failure leaves `accountant` untouched; a persistence failure
/// keeps the in-memory advance so the next successful write is still accurate.
pub async fn run_cycle<S: CounterSource>(
    source: &mut S,
    accountant: &mut Accountant,
    sinks: &Sinks,
    config: &WorkerConfig,
) -> CycleOutcome {
    debug!(phase = ?Phase::Sampling);
    let batch = match timeout(config.source_timeout, source.sample()).await {
        Ok(Ok(batch)) => batch,
        Ok(Err(e)) => {
            warn!(error = %e, kind = e.kind(), operation = "sample", "Cycle abandoned");
            return CycleOutcome::SourceFailed;
        }
        Err(_) => {
            warn!(
                timeout_ms = config.source_timeout.as_millis() as u64,
                kind = "source_unavailable",
                operation = "sample",
                "Cycle abandoned: counter source timed out"
            );
            return CycleOutcome::SourceFailed;
        }
    };

    debug!(phase = ?Phase::Computing, samples = batch.samples.len());
    let report = accountant.process(batch);
    log_report(&report);

    debug!(phase = ?Phase::Persisting);
    let records = report.history_records();
    let snapshot = Arc::new(accountant.snapshot(report.captured_at));
    sinks.summary_tx.send_replace(Some(snapshot.clone()));

    let appended = bounded(config.write_timeout, sinks.history.append(&records)).await;
    let history_written = match appended {
        Ok(()) => true,
        Err(e) => {
            warn!(
                error = %e,
                operation = "append_history",
                rows = records.len(),
                "History append failed"
            );
            false
        }
    };
    let saved = bounded(config.write_timeout, sinks.snapshots.save(&snapshot)).await;
    let snapshot_written = match saved {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, operation = "save_snapshot", "Snapshot write failed");
            false
        }
    };

    if history_written && snapshot_written {
        CycleOutcome::Completed {
            entities: report.deltas.len(),
            history_rows: records.len(),
        }
    } else {
        CycleOutcome::PersistFailed {
            history_written,
            snapshot_written,
        }
    }
}

async fn bounded(limit: Duration, write: impl Future<Output = Result<()>>) -> Result<()> {
    match timeout(limit, write).await {
        Ok(result) => result,
        Err(_) => Err(AccountingError::PersistenceWriteFailure(format!(
            "timed out after {} ms",
            limit.as_millis()
        ))),
    }
}

/// Best-effort final snapshot. Skipped when no cycle ran, so a restored (or unreadable)
/// snapshot on disk is left as it was.
async fn flush_on_shutdown(accountant: &Accountant, sinks: &Sinks, config: &WorkerConfig) {
    let Some(report) = accountant.last_report() else {
        return;
    };
    let snapshot = accountant.snapshot(report.captured_at);
    match bounded(config.write_timeout, sinks.snapshots.save(&snapshot)).await {
        Ok(()) => debug!(operation = "save_snapshot", "Final snapshot flushed"),
        Err(e) => warn!(error = %e, operation = "save_snapshot", "Final snapshot flush failed"),
    }
}

fn log_report(report: &CycleReport) {
    info!(
        entities = report.deltas.len(),
        new_entities = report.new_entities(),
        resets = report.resets(),
        interval_tx_gib = %format!("{:.2}", gib(report.interval.tx_bytes)),
        interval_rx_gib = %format!("{:.2}", gib(report.interval.rx_bytes)),
        cumulative_tx_gib = %format!("{:.2}", gib(report.cumulative.tx_bytes)),
        cumulative_rx_gib = %format!("{:.2}", gib(report.cumulative.rx_bytes)),
        captured_at = %report.captured_at,
        "Traffic collected"
    );
    for (rank, entry) in report.top_interval.iter().enumerate() {
        info!(
            rank = rank + 1,
            key = %entry.key,
            bytes = entry.total_bytes,
            gib = %format!("{:.2}", gib(entry.total_bytes)),
            "Top consumer this interval"
        );
    }
}

/// Fresh watch channel, seeded with a restored snapshot if any.
pub fn summary_channel(initial: Option<Snapshot>) -> (SummaryTx, SummaryRx) {
    watch::channel(initial.map(Arc::new))
}
