// History row and snapshot document (the two persisted artifacts)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AggregateEntry, EntityKind, EntityState, IntervalDelta, TrafficTotals};

/// One history row: one entity, one interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub total_bytes: u64,
    pub interval_start: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

impl From<&IntervalDelta> for HistoryRecord {
    fn from(d: &IntervalDelta) -> Self {
        HistoryRecord {
            entity_id: d.entity_id.clone(),
            address: d.address.clone(),
            peer: d.peer.clone(),
            protocol: d.protocol.clone(),
            tx_bytes: d.interval_tx,
            rx_bytes: d.interval_rx,
            total_bytes: d.interval_total(),
            interval_start: d.interval_start,
            timestamp: d.interval_end,
        }
    }
}

/// Current snapshot document layout. Bump when a field changes meaning.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Latest summary, overwritten every cycle. Also the restart checkpoint for cumulative state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub schema_version: u32,
    pub entity_kind: EntityKind,
    pub timestamp: DateTime<Utc>,
    pub interval: TrafficTotals,
    pub cumulative: TrafficTotals,
    pub top_interval: Vec<AggregateEntry>,
    pub top_cumulative: Vec<AggregateEntry>,
    pub entities: Vec<EntityState>,
}
