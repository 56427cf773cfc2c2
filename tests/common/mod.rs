// Shared test helpers: sample builders, a scripted counter source and a hand-driven ticker

#![allow(dead_code)]

use std::collections::VecDeque;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use trafficmon::error::{AccountingError, Result};
use trafficmon::models::{RawSample, SampleBatch};
use trafficmon::source::CounterSource;
use trafficmon::worker::Ticker;

/// 2024-05-01 00:00:00 UTC plus `minutes`.
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

pub fn iface(name: &str, tx: u64, rx: u64, minutes: i64) -> RawSample {
    RawSample {
        entity_id: name.to_string(),
        address: None,
        peer: None,
        protocol: None,
        tx_bytes: tx,
        rx_bytes: rx,
        captured_at: at(minutes),
    }
}

pub fn conn(id: &str, src: &str, tx: u64, rx: u64, minutes: i64) -> RawSample {
    RawSample {
        entity_id: id.to_string(),
        address: Some(src.to_string()),
        peer: None,
        protocol: None,
        tx_bytes: tx,
        rx_bytes: rx,
        captured_at: at(minutes),
    }
}

pub fn batch(minutes: i64, samples: Vec<RawSample>) -> SampleBatch {
    SampleBatch::new(at(minutes), samples)
}

/// Replays queued results; fails with `SourceUnavailable` once the script runs out.
#[derive(Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<SampleBatch>>,
    pub calls: usize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<SampleBatch>>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
        }
    }
}

impl CounterSource for ScriptedSource {
    async fn sample(&mut self) -> Result<SampleBatch> {
        self.calls += 1;
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(AccountingError::SourceUnavailable("script exhausted".into())))
    }
}

/// Never answers; stands in for a hung router.
pub struct HangingSource;

impl CounterSource for HangingSource {
    async fn sample(&mut self) -> Result<SampleBatch> {
        std::future::pending().await
    }
}

/// Fires once per message sent on the paired channel; pends forever once the sender is gone.
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

pub fn manual_ticker() -> (mpsc::UnboundedSender<()>, ManualTicker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ManualTicker { rx })
}

impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}
