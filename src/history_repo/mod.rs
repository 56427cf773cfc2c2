// Append-only traffic history. Backend chosen by config: JSON Lines file (default)
// or a SQLite table.

mod jsonl;
mod sqlite;

pub use jsonl::{
    HISTORY_SCHEMA, HISTORY_SCHEMA_VERSION, HistoryHeader, JsonlHistory, parse_history,
};
pub use sqlite::SqliteHistory;

use serde::Deserialize;

use crate::error::Result;
use crate::models::HistoryRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Jsonl,
    Sqlite,
}

impl HistoryBackend {
    /// Guess from a file name: `.db`, `.sqlite`, `.sqlite3` are SQLite, anything else JSON Lines.
    pub fn from_path(path: &str) -> Self {
        let ext = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("db" | "sqlite" | "sqlite3") => HistoryBackend::Sqlite,
            _ => HistoryBackend::Jsonl,
        }
    }
}

/// Records read back from a history store.
#[derive(Debug, Default, Clone)]
pub struct HistoryScan {
    /// Present for JSON Lines files that start with a header.
    pub header: Option<HistoryHeader>,
    pub records: Vec<HistoryRecord>,
    /// Malformed records that were skipped.
    pub skipped: usize,
}

pub enum HistoryRepo {
    Jsonl(JsonlHistory),
    Sqlite(SqliteHistory),
}

impl HistoryRepo {
    /// Open (and for SQLite, initialise) the configured backend.
    pub async fn open(backend: HistoryBackend, path: &str) -> anyhow::Result<Self> {
        match backend {
            HistoryBackend::Jsonl => Ok(Self::Jsonl(JsonlHistory::new(path)?)),
            HistoryBackend::Sqlite => {
                let repo = SqliteHistory::connect(path).await?;
                repo.init().await?;
                Ok(Self::Sqlite(repo))
            }
        }
    }

    /// Open an existing store for reading only. Nothing is created or migrated; a missing
    /// file is an error rather than an empty history.
    pub async fn open_read_only(backend: HistoryBackend, path: &str) -> anyhow::Result<Self> {
        match backend {
            HistoryBackend::Jsonl => {
                anyhow::ensure!(
                    std::path::Path::new(path).is_file(),
                    "history file {} does not exist",
                    path
                );
                Ok(Self::Jsonl(JsonlHistory::existing(path)))
            }
            HistoryBackend::Sqlite => Ok(Self::Sqlite(SqliteHistory::open_read_only(path).await?)),
        }
    }

    pub fn backend(&self) -> HistoryBackend {
        match self {
            Self::Jsonl(_) => HistoryBackend::Jsonl,
            Self::Sqlite(_) => HistoryBackend::Sqlite,
        }
    }

    pub async fn append(&self, records: &[HistoryRecord]) -> Result<()> {
        match self {
            Self::Jsonl(repo) => repo.append(records).await,
            Self::Sqlite(repo) => repo.append(records).await,
        }
    }

    pub async fn read_all(&self) -> anyhow::Result<HistoryScan> {
        match self {
            Self::Jsonl(repo) => repo.read_all().await,
            Self::Sqlite(repo) => repo.read_all().await,
        }
    }
}
