// Domain models

mod history;
mod sample;
mod usage;

pub use history::{HistoryRecord, SNAPSHOT_SCHEMA_VERSION, Snapshot};
pub use sample::{EntityKind, RawSample, SampleBatch};
pub use usage::{AggregateEntry, EntityState, IntervalDelta, TrafficTotals, gib};
