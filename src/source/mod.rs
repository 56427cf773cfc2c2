// Counter sources. The accounting core only sees the CounterSource contract;
// concrete adapters are picked from config.

pub mod local;
pub mod routeros;

use std::future::Future;

pub use local::LocalSource;
pub use routeros::{RouterOsParams, RouterOsSource};

use crate::config::{SourceConfig, SourceKind};
use crate::error::Result;
use crate::models::{EntityKind, SampleBatch};

/// Point-in-time read of a device's monotonic counters.
///
/// Fails with `SourceUnavailable` when the whole read is unusable. Implementations do
/// not retry; the worker tries again on its next tick. A cancelled call must leave the
/// source usable for the next one.
pub trait CounterSource: Send {
    fn sample(&mut self) -> impl Future<Output = Result<SampleBatch>> + Send;
}

pub enum Source {
    RouterOs(RouterOsSource),
    Local(LocalSource),
}

impl Source {
    /// Build the configured adapter. Config is already validated, so a routeros
    /// password is present.
    pub fn from_config(config: &SourceConfig) -> Self {
        match config.kind {
            SourceKind::RouterOs => Source::RouterOs(RouterOsSource::new(RouterOsParams {
                host: config.host.clone(),
                port: config.port,
                username: config.username.clone(),
                password: config.password.clone().unwrap_or_default(),
                entities: config.entities,
            })),
            SourceKind::Local => Source::Local(LocalSource::new()),
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Source::RouterOs(s) => s.entity_kind(),
            Source::Local(_) => EntityKind::Interfaces,
        }
    }
}

impl CounterSource for Source {
    async fn sample(&mut self) -> Result<SampleBatch> {
        match self {
            Source::RouterOs(s) => s.sample().await,
            Source::Local(s) => s.sample().await,
        }
    }
}

impl CounterSource for RouterOsSource {
    async fn sample(&mut self) -> Result<SampleBatch> {
        RouterOsSource::sample(self).await
    }
}

impl CounterSource for LocalSource {
    async fn sample(&mut self) -> Result<SampleBatch> {
        LocalSource::sample(self).await
    }
}
