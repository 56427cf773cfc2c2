// This host's own interfaces via sysinfo. Uses the since-boot totals, which behave
// like device counters: monotonic until the interface or host restarts.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use sysinfo::Networks;
use tracing::instrument;

use crate::error::{AccountingError, Result};
use crate::models::{RawSample, SampleBatch};

pub struct LocalSource {
    networks: Arc<Mutex<Networks>>,
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSource {
    pub fn new() -> Self {
        Self {
            networks: Arc::new(Mutex::new(Networks::new_with_refreshed_list())),
        }
    }

    #[instrument(skip(self), fields(source = "local", operation = "sample"))]
    pub async fn sample(&mut self) -> Result<SampleBatch> {
        let networks = self.networks.clone();
        tokio::task::spawn_blocking(move || {
            let mut networks = networks.lock().map_err(|e| {
                AccountingError::SourceUnavailable(format!("sysinfo lock poisoned: {}", e))
            })?;
            networks.refresh(true);
            let captured_at = Utc::now();
            let mut samples: Vec<RawSample> = networks
                .list()
                .iter()
                .map(|(name, data)| RawSample {
                    entity_id: name.clone(),
                    address: None,
                    peer: None,
                    protocol: None,
                    tx_bytes: data.total_transmitted(),
                    rx_bytes: data.total_received(),
                    captured_at,
                })
                .collect();
            samples.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
            Ok(SampleBatch::new(captured_at, samples))
        })
        .await
        .map_err(|e| AccountingError::SourceUnavailable(format!("sysinfo task join: {}", e)))?
    }
}
