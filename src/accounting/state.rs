// Cumulative state: per-entity running totals and last raw readings.
// Owned by the worker task; the snapshot store is its only durability.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use super::delta::{PreviousRaw, delta};
use crate::models::{EntityState, IntervalDelta, RawSample, TrafficTotals};

#[derive(Debug, Default, Clone)]
pub struct CumulativeState {
    entities: HashMap<String, EntityState>,
    /// Entities whose last raw reading was observed by this process and can anchor a delta.
    /// Restored entities are absent until re-observed.
    primed: HashSet<String>,
}

impl CumulativeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entity records. Totals carry over; raw baselines do not,
    /// so the next observation of each entity yields a zero delta.
    pub fn restore(entities: impl IntoIterator<Item = EntityState>) -> Self {
        let entities = entities
            .into_iter()
            .map(|e| (e.entity_id.clone(), e))
            .collect();
        Self {
            entities,
            primed: HashSet::new(),
        }
    }

    /// Compute the delta for `sample` against the last reading and apply it.
    pub fn observe(&mut self, sample: &RawSample) -> IntervalDelta {
        let previous = if self.primed.contains(&sample.entity_id) {
            self.entities.get(&sample.entity_id).map(|e| PreviousRaw {
                tx: e.last_raw_tx,
                rx: e.last_raw_rx,
                captured_at: e.last_captured_at,
            })
        } else {
            None
        };

        let d = delta(&sample.entity_id, previous, sample);
        if d.is_reset() {
            warn!(
                entity = %sample.entity_id,
                previous_tx = previous.map(|p| p.tx),
                previous_rx = previous.map(|p| p.rx),
                current_tx = sample.tx_bytes,
                current_rx = sample.rx_bytes,
                operation = "delta",
                "counter reset detected; counting post-reset value as interval"
            );
        }
        self.apply(&d, sample);
        d
    }

    /// Add `d` to the entity's totals and advance its raw baseline to `current`.
    pub fn apply(&mut self, d: &IntervalDelta, current: &RawSample) -> &EntityState {
        self.primed.insert(d.entity_id.clone());
        let entry = self
            .entities
            .entry(d.entity_id.clone())
            .or_insert_with(|| EntityState {
                entity_id: d.entity_id.clone(),
                address: None,
                last_raw_tx: 0,
                last_raw_rx: 0,
                last_captured_at: current.captured_at,
                cumulative_tx: 0,
                cumulative_rx: 0,
            });
        entry.cumulative_tx = entry.cumulative_tx.saturating_add(d.interval_tx);
        entry.cumulative_rx = entry.cumulative_rx.saturating_add(d.interval_rx);
        entry.last_raw_tx = current.tx_bytes;
        entry.last_raw_rx = current.rx_bytes;
        entry.last_captured_at = current.captured_at;
        if current.address.is_some() {
            entry.address = current.address.clone();
        }
        entry
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityState> {
        self.entities.get(entity_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity records sorted by id (stable snapshot output).
    pub fn entities(&self) -> Vec<EntityState> {
        let mut out: Vec<EntityState> = self.entities.values().cloned().collect();
        out.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        out
    }

    /// Global scope: sum over every entity ever seen.
    pub fn totals(&self) -> TrafficTotals {
        let mut totals = TrafficTotals::default();
        for e in self.entities.values() {
            totals.add(e.cumulative_tx, e.cumulative_rx);
        }
        totals
    }
}
