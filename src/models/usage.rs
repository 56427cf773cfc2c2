// Derived per-interval usage, rankings and totals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mutable per-entity record owned by the cumulative state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub last_raw_tx: u64,
    pub last_raw_rx: u64,
    pub last_captured_at: DateTime<Utc>,
    pub cumulative_tx: u64,
    pub cumulative_rx: u64,
}

impl EntityState {
    pub fn cumulative_total(&self) -> u64 {
        self.cumulative_tx.saturating_add(self.cumulative_rx)
    }
}

/// Bytes moved by one entity between two consecutive observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalDelta {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub interval_tx: u64,
    pub interval_rx: u64,
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    /// The tx counter went backwards; `interval_tx` is the post-reset raw value.
    #[serde(default)]
    pub tx_reset: bool,
    #[serde(default)]
    pub rx_reset: bool,
    /// First observation: no previous reading, delta is zero by definition.
    #[serde(default)]
    pub baseline: bool,
}

impl IntervalDelta {
    pub fn interval_total(&self) -> u64 {
        self.interval_tx.saturating_add(self.interval_rx)
    }

    pub fn is_reset(&self) -> bool {
        self.tx_reset || self.rx_reset
    }
}

/// One row of a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateEntry {
    pub key: String,
    pub total_bytes: u64,
}

/// tx/rx pair used for the global scope (interval and cumulative).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTotals {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
}

impl TrafficTotals {
    pub fn add(&mut self, tx: u64, rx: u64) {
        self.tx_bytes = self.tx_bytes.saturating_add(tx);
        self.rx_bytes = self.rx_bytes.saturating_add(rx);
    }

    pub fn total(&self) -> u64 {
        self.tx_bytes.saturating_add(self.rx_bytes)
    }
}

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// Bytes as GiB, for log lines.
pub fn gib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIB
}
