use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use trafficmon::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(
        name = version::NAME,
        version = version::VERSION,
        source = ?app_config.source,
        "Starting"
    );

    let source = source::Source::from_config(&app_config.source);
    let kind = source.entity_kind();
    let group_by = app_config.accounting.group_by_for(kind);
    let top_n = app_config.accounting.top_n;

    let history = Arc::new(
        history_repo::HistoryRepo::open(
            app_config.storage.history_backend,
            &app_config.storage.history_path,
        )
        .await?,
    );
    let snapshots = Arc::new(snapshot_store::SnapshotStore::new(
        &app_config.storage.snapshot_path,
    )?);

    let restored = snapshots.load_or_empty(kind).await;
    let accountant = match restored.clone() {
        Some(snapshot) => accounting::Accountant::from_snapshot(snapshot, group_by, top_n),
        None => accounting::Accountant::new(kind, group_by, top_n),
    };
    let (summary_tx, summary_rx) = worker::summary_channel(restored);

    let ticker = worker::Schedule::new(
        Duration::from_secs(app_config.accounting.poll_interval_secs),
        app_config.accounting.schedule.as_deref(),
    )?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            source,
            ticker,
            accountant,
            sinks: worker::Sinks {
                history,
                snapshots,
                summary_tx,
            },
            shutdown_rx,
        },
        worker::WorkerConfig {
            source_timeout: Duration::from_millis(app_config.source.timeout_ms),
            write_timeout: Duration::from_millis(app_config.storage.write_timeout_ms),
        },
    );

    match app_config.server {
        Some(ref server) => {
            let app = routes::app(summary_rx);
            let addr = format!("{}:{}", server.host, server.port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Status API listening on http://{}", addr);
            routes::serve_until(listener, app, shutdown_signal()).await;
        }
        None => shutdown_signal().await,
    }

    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(());
    match worker_handle.await {
        Ok(accountant) => {
            let totals = accountant.state().totals();
            tracing::info!(
                entities = accountant.state().len(),
                cumulative_tx = totals.tx_bytes,
                cumulative_rx = totals.rx_bytes,
                "Shut down cleanly"
            );
        }
        Err(e) => tracing::error!(error = %e, "Worker task failed"),
    }
    Ok(())
}

/// Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
