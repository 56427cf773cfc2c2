// Raw counter readings as produced by a counter source

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the tracked entities are. Stored in the snapshot so state recorded for
/// one kind is never restored into the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Interfaces,
    Connections,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Interfaces => "interfaces",
            EntityKind::Connections => "connections",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entity's monotonic counters at one poll.
/// For connections, `tx` is the original direction and `rx` the reply direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSample {
    pub entity_id: String,
    /// Source address (with port) for connections; `None` for interfaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Destination address (with port) for connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    /// Connection protocol (`tcp`, `udp`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub captured_at: DateTime<Utc>,
}

/// Everything one source query returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBatch {
    pub captured_at: DateTime<Utc>,
    pub samples: Vec<RawSample>,
}

impl SampleBatch {
    pub fn new(captured_at: DateTime<Utc>, samples: Vec<RawSample>) -> Self {
        Self {
            captured_at,
            samples,
        }
    }

    /// Merge samples sharing an entity id by summing their counters, keeping first-seen order.
    /// Connection tables without stable ids can report two flows under the same fallback key.
    pub fn merge_duplicates(self) -> Self {
        let mut merged: Vec<RawSample> = Vec::with_capacity(self.samples.len());
        let mut index: std::collections::HashMap<String, usize> =
            std::collections::HashMap::with_capacity(self.samples.len());
        for sample in self.samples {
            match index.get(&sample.entity_id) {
                Some(&i) => {
                    let existing = &mut merged[i];
                    existing.tx_bytes = existing.tx_bytes.saturating_add(sample.tx_bytes);
                    existing.rx_bytes = existing.rx_bytes.saturating_add(sample.rx_bytes);
                }
                None => {
                    index.insert(sample.entity_id.clone(), merged.len());
                    merged.push(sample);
                }
            }
        }
        Self {
            captured_at: self.captured_at,
            samples: merged,
        }
    }
}
