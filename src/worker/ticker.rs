// Cycle timing. The worker only needs "wait for the next cycle"; tests drive it by hand.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::warn;

/// Resolves when the next cycle is due. Must be cancel-safe: the worker drops a
/// pending `tick` when shutdown wins the race.
pub trait Ticker: Send {
    fn tick(&mut self) -> impl Future<Output = ()> + Send;
}

/// Fixed period; first tick fires immediately. Missed ticks (long outage, suspended
/// host) are skipped, not replayed, so a gap becomes one longer interval.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Cron schedule in local time. Fires once immediately so the baseline reading is
/// taken at startup and the first scheduled cycle already has an interval.
pub struct CronTicker {
    schedule: cron::Schedule,
    fired_initial: bool,
}

impl CronTicker {
    pub fn new(expr: &str) -> anyhow::Result<Self> {
        let schedule = cron::Schedule::from_str(expr)
            .map_err(|e| anyhow::anyhow!("invalid cron expression {:?}: {}", expr, e))?;
        Ok(Self {
            schedule,
            fired_initial: false,
        })
    }
}

impl Ticker for CronTicker {
    async fn tick(&mut self) {
        if !self.fired_initial {
            self.fired_initial = true;
            return;
        }
        loop {
            let now = chrono::Local::now();
            let next = self.schedule.after(&now).next();
            match next {
                Some(next) => {
                    let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                    tokio::time::sleep(delay).await;
                    return;
                }
                None => {
                    warn!("cron schedule has no upcoming time; checking again in an hour");
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
            }
        }
    }
}

/// Config-selected ticker.
pub enum Schedule {
    Interval(IntervalTicker),
    Cron(CronTicker),
}

impl Schedule {
    pub fn new(poll_interval: Duration, cron: Option<&str>) -> anyhow::Result<Self> {
        match cron {
            Some(expr) => Ok(Schedule::Cron(CronTicker::new(expr)?)),
            None => Ok(Schedule::Interval(IntervalTicker::new(poll_interval))),
        }
    }
}

impl Ticker for Schedule {
    async fn tick(&mut self) {
        match self {
            Schedule::Interval(t) => t.tick().await,
            Schedule::Cron(t) => t.tick().await,
        }
    }
}
