// Latest-summary snapshot: one JSON document, replaced atomically each cycle
// (write temp file, fsync, rename over the old one).

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument};

use crate::error::{AccountingError, Result};
use crate::models::{EntityKind, SNAPSHOT_SCHEMA_VERSION, Snapshot};

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    #[instrument(skip(self, snapshot), fields(repo = "snapshot", operation = "save", entities = snapshot.entities.len()))]
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let body = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| AccountingError::PersistenceWriteFailure(format!("encode: {}", e)))?;
        let tmp = self.temp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read the snapshot. `Ok(None)` when none exists yet; `CorruptSnapshot` when it cannot
    /// be used for `expected_kind`.
    pub async fn load(&self, expected_kind: EntityKind) -> Result<Option<Snapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AccountingError::CorruptSnapshot(format!("read: {}", e))),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| AccountingError::CorruptSnapshot(format!("parse: {}", e)))?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(AccountingError::CorruptSnapshot(format!(
                "schema version {} (expected {})",
                snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION
            )));
        }
        if snapshot.entity_kind != expected_kind {
            return Err(AccountingError::CorruptSnapshot(format!(
                "snapshot tracks {}, configured for {}",
                snapshot.entity_kind, expected_kind
            )));
        }
        Ok(Some(snapshot))
    }

    /// Startup restore: a corrupt snapshot is a logged data-loss event, never fatal.
    pub async fn load_or_empty(&self, expected_kind: EntityKind) -> Option<Snapshot> {
        match self.load(expected_kind).await {
            Ok(Some(s)) => {
                info!(
                    path = %self.path.display(),
                    entities = s.entities.len(),
                    taken_at = %s.timestamp,
                    "Restored cumulative state from snapshot"
                );
                Some(s)
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No snapshot found; starting from zero");
                None
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    kind = e.kind(),
                    "Snapshot unusable; cumulative totals restart from zero"
                );
                None
            }
        }
    }
}
