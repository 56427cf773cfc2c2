// JSON Lines history file. Line 1 is a schema header written once when the file is
// created; every following line is one HistoryRecord. Appends never rewrite.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{instrument, warn};

use super::HistoryScan;
use crate::error::{AccountingError, Result};
use crate::models::HistoryRecord;

pub const HISTORY_SCHEMA: &str = "trafficmon.history";
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryHeader {
    pub schema: String,
    pub version: u32,
}

impl HistoryHeader {
    pub fn current() -> Self {
        Self {
            schema: HISTORY_SCHEMA.to_string(),
            version: HISTORY_SCHEMA_VERSION,
        }
    }
}

pub struct JsonlHistory {
    path: PathBuf,
}

impl JsonlHistory {
    /// Create the parent directory if missing. The file itself is created on first append.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Wrap a path without touching the filesystem.
    pub fn existing(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self, records), fields(repo = "history", backend = "jsonl", operation = "append", records_count = records.len()))]
    pub async fn append(&self, records: &[HistoryRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut buf: Vec<u8> = Vec::with_capacity(records.len() * 160);
        let mut len = file.metadata().await?.len();
        if len > 0 && len <= MAX_HEADER_LEN && is_torn_header(&mut file, len).await? {
            // The first write never completed: the file holds nothing but part of the header.
            warn!(
                path = %self.path.display(),
                "history file holds only a torn header; rewriting it"
            );
            file.set_len(0).await?;
            len = 0;
        }
        if len == 0 {
            encode_line(&mut buf, &HistoryHeader::current())?;
        } else {
            // A crash mid-append leaves an unterminated line; close it off so the
            // new records start on a fresh line.
            file.seek(SeekFrom::End(-1)).await?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                warn!(
                    path = %self.path.display(),
                    "history file ends mid-line; terminating torn record"
                );
                buf.push(b'\n');
            }
        }
        for record in records {
            encode_line(&mut buf, record)?;
        }

        file.write_all(&buf).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Read every well-formed record. Malformed lines (torn trailing write, hand edits)
    /// are skipped and counted. A missing file reads as empty.
    pub async fn read_all(&self) -> anyhow::Result<HistoryScan> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HistoryScan::default());
            }
            Err(e) => return Err(e.into()),
        };
        parse_history(&bytes)
    }
}

/// Longer than any header line this crate writes.
const MAX_HEADER_LEN: u64 = 4096;

/// True when the whole file is one unterminated line that is a prefix of a header
/// rather than a header or a record.
async fn is_torn_header(file: &mut tokio::fs::File, len: u64) -> Result<bool> {
    file.seek(SeekFrom::Start(0)).await?;
    let mut body = vec![0u8; len as usize];
    file.read_exact(&mut body).await?;
    if body.contains(&b'\n') {
        return Ok(false);
    }
    if serde_json::from_slice::<HistoryHeader>(&body).is_ok()
        || serde_json::from_slice::<HistoryRecord>(&body).is_ok()
    {
        return Ok(false);
    }
    let text = String::from_utf8_lossy(&body);
    let text = text.trim_start();
    Ok(text.starts_with("{\"schema\"") || "{\"schema\"".starts_with(text))
}

fn encode_line<T: Serialize>(buf: &mut Vec<u8>, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *buf, value)
        .map_err(|e| AccountingError::PersistenceWriteFailure(format!("encode: {}", e)))?;
    buf.push(b'\n');
    Ok(())
}

/// Parse a history file body.
pub fn parse_history(bytes: &[u8]) -> anyhow::Result<HistoryScan> {
    let mut scan = HistoryScan::default();
    let mut lines = bytes
        .split(|b| *b == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace));

    let Some((first_no, first)) = lines.next() else {
        return Ok(scan);
    };
    match serde_json::from_slice::<HistoryHeader>(first) {
        Ok(header) => {
            anyhow::ensure!(
                header.schema == HISTORY_SCHEMA,
                "not a trafficmon history file (schema {:?})",
                header.schema
            );
            if header.version != HISTORY_SCHEMA_VERSION {
                warn!(
                    version = header.version,
                    expected = HISTORY_SCHEMA_VERSION,
                    "history schema version differs; reading best-effort"
                );
            }
            scan.header = Some(header);
        }
        Err(_) => push_record(&mut scan, first_no, first),
    }
    for (line_no, line) in lines {
        push_record(&mut scan, line_no, line);
    }
    Ok(scan)
}

fn push_record(scan: &mut HistoryScan, line_no: usize, line: &[u8]) {
    match serde_json::from_slice::<HistoryRecord>(line) {
        Ok(r) => scan.records.push(r),
        Err(e) => {
            warn!(line = line_no + 1, error = %e, "Skipping malformed history record");
            scan.skipped += 1;
        }
    }
}
