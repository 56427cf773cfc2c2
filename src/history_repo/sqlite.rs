// SQLite history. One row per entity per interval in traffic_history; the
// schema_version table is the schema marker, checked on every open.
//
// Schema versions:
//   1  recorded_at, interval_start, entity_id, address, tx/rx/total bytes
//   2  + peer, protocol (nullable; connections only)

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::{info, instrument};

use super::HistoryScan;
use crate::error::Result;
use crate::models::HistoryRecord;

const SCHEMA_KEY: &str = "traffic_history";
const SCHEMA_VERSION: i64 = 2;

pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Connect to SQLite at `path`, create parent dir and DB if missing, enable WAL + pragmas.
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Open an existing history database for reading. Never creates or migrates anything;
    /// fails if the file is missing or holds another schema version.
    pub async fn open_read_only(path: &str) -> anyhow::Result<Self> {
        anyhow::ensure!(
            Path::new(path).is_file(),
            "history database {} does not exist",
            path
        );
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .read_only(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let repo = Self { pool };

        let stored = repo
            .stored_version()
            .await
            .map_err(|e| anyhow::anyhow!("{} is not a trafficmon history database: {}", path, e))?;
        anyhow::ensure!(
            stored == SCHEMA_VERSION,
            "traffic_history schema version {} in {} (expected {}); start the daemon once to upgrade",
            stored,
            path,
            SCHEMA_VERSION
        );
        Ok(repo)
    }

    async fn stored_version(&self) -> anyhow::Result<i64> {
        let stored: i64 = sqlx::query("SELECT value FROM schema_version WHERE key = $1")
            .bind(SCHEMA_KEY)
            .fetch_one(&self.pool)
            .await?
            .try_get("value")?;
        Ok(stored)
    }

    /// Create tables if missing, check the stored schema version and upgrade older ones.
    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (key TEXT PRIMARY KEY, value INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS traffic_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at INTEGER NOT NULL,
                interval_start INTEGER NOT NULL,
                entity_id TEXT NOT NULL,
                address TEXT,
                peer TEXT,
                protocol TEXT,
                tx_bytes INTEGER NOT NULL,
                rx_bytes INTEGER NOT NULL,
                total_bytes INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_traffic_recorded_at ON traffic_history(recorded_at)",
        )
        .execute(&self.pool)
        .await?;

        // A fresh database is created at the current version; an existing one keeps its row.
        sqlx::query("INSERT OR IGNORE INTO schema_version (key, value) VALUES ($1, $2)")
            .bind(SCHEMA_KEY)
            .bind(SCHEMA_VERSION)
            .execute(&self.pool)
            .await?;

        let stored = self.stored_version().await?;
        anyhow::ensure!(
            (1..=SCHEMA_VERSION).contains(&stored),
            "traffic_history schema version {} is not supported (expected {})",
            stored,
            SCHEMA_VERSION
        );
        if stored < 2 {
            self.upgrade_to_v2().await?;
        }
        Ok(())
    }

    async fn upgrade_to_v2(&self) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("ALTER TABLE traffic_history ADD COLUMN peer TEXT")
            .execute(&mut *tx)
            .await?;
        sqlx::query("ALTER TABLE traffic_history ADD COLUMN protocol TEXT")
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE schema_version SET value = $1 WHERE key = $2")
            .bind(2i64)
            .bind(SCHEMA_KEY)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(from = 1, to = 2, "Upgraded traffic_history schema");
        Ok(())
    }

    #[instrument(skip(self, records), fields(repo = "history", backend = "sqlite", operation = "append", records_count = records.len()))]
    pub async fn append(&self, records: &[HistoryRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for r in records {
            sqlx::query(
                "INSERT INTO traffic_history (recorded_at, interval_start, entity_id, address, peer, protocol, tx_bytes, rx_bytes, total_bytes) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(r.timestamp.timestamp_millis())
            .bind(r.interval_start.timestamp_millis())
            .bind(&r.entity_id)
            .bind(r.address.as_deref())
            .bind(r.peer.as_deref())
            .bind(r.protocol.as_deref())
            .bind(r.tx_bytes as i64)
            .bind(r.rx_bytes as i64)
            .bind(r.total_bytes as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Every row in insertion order. Rows with out-of-range timestamps are skipped.
    pub async fn read_all(&self) -> anyhow::Result<HistoryScan> {
        let rows = sqlx::query(
            "SELECT recorded_at, interval_start, entity_id, address, peer, protocol,
                    tx_bytes, rx_bytes, total_bytes
             FROM traffic_history ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scan = HistoryScan::default();
        for row in rows {
            match Self::parse_row(&row) {
                Ok(r) => scan.records.push(r),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed history row");
                    scan.skipped += 1;
                }
            }
        }
        Ok(scan)
    }

    fn parse_row(row: &SqliteRow) -> anyhow::Result<HistoryRecord> {
        let recorded_at: i64 = row.try_get("recorded_at")?;
        let interval_start: i64 = row.try_get("interval_start")?;
        let tx_bytes: i64 = row.try_get("tx_bytes")?;
        let rx_bytes: i64 = row.try_get("rx_bytes")?;
        let total_bytes: i64 = row.try_get("total_bytes")?;
        Ok(HistoryRecord {
            entity_id: row.try_get("entity_id")?,
            address: row.try_get("address")?,
            peer: row.try_get("peer")?,
            protocol: row.try_get("protocol")?,
            tx_bytes: tx_bytes as u64,
            rx_bytes: rx_bytes as u64,
            total_bytes: total_bytes as u64,
            interval_start: millis_to_utc(interval_start)?,
            timestamp: millis_to_utc(recorded_at)?,
        })
    }
}

fn millis_to_utc(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", ms))
}
