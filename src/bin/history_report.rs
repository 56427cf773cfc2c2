// Top consumers over the whole recorded history. Opens the store read-only.
//
// Usage: cargo run --bin history_report -- [HISTORY_PATH] [TOP_N] [GROUP_BY]
//   HISTORY_PATH  default: storage.history_path from $CONFIG_FILE, else ./data/history.jsonl
//                 (.db / .sqlite / .sqlite3 read as SQLite)
//   TOP_N         default: 10
//   GROUP_BY      entity | source_address, default: the daemon's policy from $CONFIG_FILE,
//                 else source_address when the rows carry addresses

use std::env;

use trafficmon::accounting::{GroupBy, aggregate, top_n};
use trafficmon::config::AppConfig;
use trafficmon::history_repo::{HistoryBackend, HistoryRepo};
use trafficmon::models::{HistoryRecord, gib};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let limit: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
    let requested = match args.get(3).map(String::as_str) {
        None => None,
        Some("entity") => Some(GroupBy::Entity),
        Some("source_address") => Some(GroupBy::SourceAddress),
        Some(other) => anyhow::bail!("unknown grouping {:?} (entity | source_address)", other),
    };

    let config = match AppConfig::load() {
        Ok(config) => Some(config),
        Err(e) => {
            if args.get(1).is_none() || requested.is_none() {
                eprintln!("no usable config ({}); using defaults", e);
            }
            None
        }
    };

    let (path, backend) = match (args.get(1), &config) {
        (Some(path), _) => (path.clone(), HistoryBackend::from_path(path)),
        (None, Some(config)) => (
            config.storage.history_path.clone(),
            config.storage.history_backend,
        ),
        (None, None) => {
            let path = "./data/history.jsonl".to_string();
            let backend = HistoryBackend::from_path(&path);
            (path, backend)
        }
    };

    let repo = HistoryRepo::open_read_only(backend, &path).await?;
    let scan = repo.read_all().await?;
    if scan.skipped > 0 {
        eprintln!("skipped {} malformed history lines", scan.skipped);
    }

    let group_by = requested
        .or_else(|| {
            config
                .as_ref()
                .map(|c| c.accounting.group_by_for(c.source.entities))
        })
        .unwrap_or_else(|| GroupBy::infer(scan.records.iter()));

    let first = scan.records.iter().map(|r| r.interval_start).min();
    let last = scan.records.iter().map(|r| r.timestamp).max();
    let ranking = top_n(
        aggregate(scan.records.iter(), |r: &HistoryRecord| group_by.key(r)),
        limit,
    );

    match (first, last) {
        (Some(first), Some(last)) => println!(
            "{} records from {} to {}, grouped by {:?}",
            scan.records.len(),
            first.format("%Y-%m-%d %H:%M"),
            last.format("%Y-%m-%d %H:%M"),
            group_by
        ),
        _ => println!("no history records in {}", path),
    }
    for (rank, entry) in ranking.iter().enumerate() {
        println!(
            "{:>3}. {:<40} {:>10.2} GiB",
            rank + 1,
            entry.key,
            gib(entry.total_bytes)
        );
    }
    Ok(())
}
