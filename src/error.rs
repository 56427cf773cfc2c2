// Accounting error taxonomy. Setup and config errors stay anyhow; these are the
// steady-state failures the worker classifies and recovers from.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountingError {
    /// Counter source unreachable, refused login, or returned garbage for the whole cycle.
    #[error("counter source unavailable: {0}")]
    SourceUnavailable(String),

    /// One entity record is missing a field; the entity is skipped for this cycle.
    #[error("entity record incomplete: {0}")]
    PartialEntityData(String),

    #[error("persistence write failed: {0}")]
    PersistenceWriteFailure(String),

    /// Snapshot unreadable or written by an incompatible schema / entity kind.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl AccountingError {
    /// Short label for the `operation`/`kind` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::PartialEntityData(_) => "partial_entity_data",
            Self::PersistenceWriteFailure(_) => "persistence_write_failure",
            Self::CorruptSnapshot(_) => "corrupt_snapshot",
        }
    }
}

impl From<std::io::Error> for AccountingError {
    fn from(e: std::io::Error) -> Self {
        Self::PersistenceWriteFailure(e.to_string())
    }
}

impl From<sqlx::Error> for AccountingError {
    fn from(e: sqlx::Error) -> Self {
        Self::PersistenceWriteFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AccountingError>;
