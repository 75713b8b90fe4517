//! Rolling per-target metrics.
//!
//! Latency windows, uptime counters and the consecutive-failure counter all
//! live in the shared [`CacheStore`]. Updates are read-modify-write without
//! transactions, so two cycles racing on the same target can lose an
//! increment. Where the store offers a native counter it is used instead,
//! which closes that window for the counters but not for the latency list.

mod percentile;

pub use percentile::*;

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{get_counter, get_samples, CacheError, CacheStore, CacheValue};
use crate::probe::ProbeOutcome;

const KEY_PREFIX: &str = "sitewatch";

fn latency_key(target_id: i64) -> String {
    format!("{}:latency:{}", KEY_PREFIX, target_id)
}

fn total_key(target_id: i64) -> String {
    format!("{}:uptime:total:{}", KEY_PREFIX, target_id)
}

fn up_key(target_id: i64) -> String {
    format!("{}:uptime:up:{}", KEY_PREFIX, target_id)
}

fn failures_key(target_id: i64) -> String {
    format!("{}:failures:{}", KEY_PREFIX, target_id)
}

/// Computes rolling metrics against a shared store.
#[derive(Clone)]
pub struct MetricsAggregator {
    store: Arc<dyn CacheStore>,
    ttl: Option<Duration>,
}

impl MetricsAggregator {
    /// `ttl` is refreshed on every write, so state only lapses after
    /// that long without a check.
    pub fn new(store: Arc<dyn CacheStore>, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }

    /// Append a latency sample and update the failure counter.
    ///
    /// Returns the window after eviction, oldest first.
    pub async fn record_sample(
        &self,
        target_id: i64,
        latency_ms: u64,
        outcome: ProbeOutcome,
        max_window: usize,
    ) -> Result<Vec<u64>, CacheError> {
        let key = latency_key(target_id);
        let mut window = get_samples(self.store.as_ref(), &key).await?;
        window.push(latency_ms);
        if window.len() > max_window {
            let excess = window.len() - max_window;
            window.drain(..excess);
        }
        self.store
            .set(&key, CacheValue::Samples(window.clone()), self.ttl)
            .await?;

        let failures = failures_key(target_id);
        if outcome.is_up() {
            self.store.remove(&failures).await?;
        } else {
            self.add(&failures, 1).await?;
        }

        Ok(window)
    }

    /// Latency window as currently stored.
    pub async fn window(&self, target_id: i64) -> Result<Vec<u64>, CacheError> {
        get_samples(self.store.as_ref(), &latency_key(target_id)).await
    }

    /// Count this check and return cumulative uptime in percent.
    pub async fn uptime(&self, target_id: i64, outcome: ProbeOutcome) -> Result<f64, CacheError> {
        let total = self.add(&total_key(target_id), 1).await?;
        // Written even when not up so both counters share one expiry.
        let up = self
            .add(&up_key(target_id), i64::from(outcome.is_up()))
            .await?;

        Ok(uptime_percent(up, total))
    }

    /// `100 - consecutive failures`. Not clamped: a long outage goes negative.
    pub async fn stability(&self, target_id: i64) -> Result<f64, CacheError> {
        let failures = get_counter(self.store.as_ref(), &failures_key(target_id)).await?;
        Ok(100.0 - failures as f64)
    }

    /// Add to a counter, natively when the store can.
    async fn add(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        if let Some(value) = self.store.increment(key, delta, self.ttl).await? {
            return Ok(value);
        }

        let next = get_counter(self.store.as_ref(), key).await? + delta;
        self.store
            .set(key, CacheValue::Counter(next), self.ttl)
            .await?;
        Ok(next)
    }
}

/// `up / total * 100`, or 100 when nothing has been counted.
pub fn uptime_percent(up: i64, total: i64) -> f64 {
    if total <= 0 {
        return 100.0;
    }
    up as f64 / total as f64 * 100.0
}
