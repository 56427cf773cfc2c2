// Delta engine: raw monotonic counters -> non-negative interval deltas.
//
// A counter that goes backwards is taken to have restarted from zero inside the
// interval (device reboot, connection-table eviction with id reuse), so the new raw
// value is the delta. Undercounts traffic seen before the reset in that interval;
// never produces a negative or wrapped delta.

use chrono::{DateTime, Utc};

use crate::models::{IntervalDelta, RawSample};

/// Outcome for a single counter channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterDelta {
    Advanced(u64),
    Reset(u64),
}

impl CounterDelta {
    pub fn bytes(self) -> u64 {
        match self {
            CounterDelta::Advanced(b) | CounterDelta::Reset(b) => b,
        }
    }

    pub fn is_reset(self) -> bool {
        matches!(self, CounterDelta::Reset(_))
    }
}

pub fn counter_delta(previous: u64, current: u64) -> CounterDelta {
    if current >= previous {
        CounterDelta::Advanced(current - previous)
    } else {
        CounterDelta::Reset(current)
    }
}

/// Previous raw reading of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousRaw {
    pub tx: u64,
    pub rx: u64,
    pub captured_at: DateTime<Utc>,
}

/// Interval delta for `current` against `previous`. `None` is a first observation:
/// zero delta, the reading becomes the baseline.
pub fn delta(
    entity_id: &str,
    previous: Option<PreviousRaw>,
    current: &RawSample,
) -> IntervalDelta {
    let Some(prev) = previous else {
        return IntervalDelta {
            entity_id: entity_id.to_string(),
            address: current.address.clone(),
            peer: current.peer.clone(),
            protocol: current.protocol.clone(),
            interval_tx: 0,
            interval_rx: 0,
            interval_start: current.captured_at,
            interval_end: current.captured_at,
            tx_reset: false,
            rx_reset: false,
            baseline: true,
        };
    };

    let tx = counter_delta(prev.tx, current.tx_bytes);
    let rx = counter_delta(prev.rx, current.rx_bytes);
    IntervalDelta {
        entity_id: entity_id.to_string(),
        address: current.address.clone(),
        peer: current.peer.clone(),
        protocol: current.protocol.clone(),
        interval_tx: tx.bytes(),
        interval_rx: rx.bytes(),
        interval_start: prev.captured_at,
        interval_end: current.captured_at,
        tx_reset: tx.is_reset(),
        rx_reset: rx.is_reset(),
        baseline: false,
    }
}
