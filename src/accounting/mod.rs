// Traffic accounting engine: one sample batch in, interval deltas, updated
// cumulative state and rankings out. Pure in-memory; persistence is the worker's job.

pub mod aggregate;
pub mod delta;
mod state;

pub use aggregate::{GroupBy, Usage, aggregate, strip_port, top_n};
pub use delta::{CounterDelta, PreviousRaw, counter_delta, delta};
pub use state::CumulativeState;

use chrono::{DateTime, Utc};

use crate::models::{
    AggregateEntry, EntityKind, EntityState, HistoryRecord, IntervalDelta,
    SNAPSHOT_SCHEMA_VERSION, SampleBatch, Snapshot, TrafficTotals,
};

/// Result of one computing phase.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub captured_at: DateTime<Utc>,
    pub deltas: Vec<IntervalDelta>,
    pub interval: TrafficTotals,
    pub cumulative: TrafficTotals,
    pub top_interval: Vec<AggregateEntry>,
    pub top_cumulative: Vec<AggregateEntry>,
}

impl CycleReport {
    pub fn resets(&self) -> usize {
        self.deltas.iter().filter(|d| d.is_reset()).count()
    }

    pub fn new_entities(&self) -> usize {
        self.deltas.iter().filter(|d| d.baseline).count()
    }

    /// History rows for this cycle. Baselines describe no interval and are left out.
    pub fn history_records(&self) -> Vec<HistoryRecord> {
        self.deltas
            .iter()
            .filter(|d| !d.baseline)
            .map(HistoryRecord::from)
            .collect()
    }
}

pub struct Accountant {
    kind: EntityKind,
    group_by: GroupBy,
    top_n: usize,
    state: CumulativeState,
    last_report: Option<CycleReport>,
}

impl Accountant {
    pub fn new(kind: EntityKind, group_by: GroupBy, top_n: usize) -> Self {
        Self::with_state(kind, group_by, top_n, CumulativeState::new())
    }

    pub fn with_state(
        kind: EntityKind,
        group_by: GroupBy,
        top_n: usize,
        state: CumulativeState,
    ) -> Self {
        Self {
            kind,
            group_by,
            top_n,
            state,
            last_report: None,
        }
    }

    /// Resume from a snapshot previously written by [`Accountant::snapshot`].
    /// The caller has already checked schema version and entity kind.
    pub fn from_snapshot(snapshot: Snapshot, group_by: GroupBy, top_n: usize) -> Self {
        let kind = snapshot.entity_kind;
        Self::with_state(
            kind,
            group_by,
            top_n,
            CumulativeState::restore(snapshot.entities),
        )
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn state(&self) -> &CumulativeState {
        &self.state
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Apply one batch. Each sample is applied exactly once; duplicates are merged first.
    pub fn process(&mut self, batch: SampleBatch) -> CycleReport {
        let batch = batch.merge_duplicates();
        let mut deltas = Vec::with_capacity(batch.samples.len());
        let mut interval = TrafficTotals::default();
        for sample in &batch.samples {
            let d = self.state.observe(sample);
            interval.add(d.interval_tx, d.interval_rx);
            deltas.push(d);
        }

        let group_by = self.group_by;
        let top_interval = top_n(
            aggregate(deltas.iter(), |d: &IntervalDelta| group_by.key(d)),
            self.top_n,
        );
        let entities = self.state.entities();
        let top_cumulative = top_n(
            aggregate(entities.iter(), |e: &EntityState| group_by.key(e)),
            self.top_n,
        );

        let report = CycleReport {
            captured_at: batch.captured_at,
            deltas,
            interval,
            cumulative: self.state.totals(),
            top_interval,
            top_cumulative,
        };
        self.last_report = Some(report.clone());
        report
    }

    /// Snapshot document for the current state. Before the first cycle, interval totals
    /// and the interval ranking are empty.
    pub fn snapshot(&self, timestamp: DateTime<Utc>) -> Snapshot {
        let entities = self.state.entities();
        let group_by = self.group_by;
        let (interval, top_interval) = match &self.last_report {
            Some(r) => (r.interval, r.top_interval.clone()),
            None => (TrafficTotals::default(), Vec::new()),
        };
        Snapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            entity_kind: self.kind,
            timestamp,
            interval,
            cumulative: self.state.totals(),
            top_interval,
            top_cumulative: top_n(
                aggregate(entities.iter(), |e: &EntityState| group_by.key(e)),
                self.top_n,
            ),
            entities,
        }
    }
}
