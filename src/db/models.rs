//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::HealthVerdict;
use crate::metrics::Percentiles;
use crate::probe::ProbeOutcome;

/// A monitored site and the metrics from its latest check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub last_status: Option<ProbeOutcome>,
    pub latency_ms: Option<u64>,
    pub latency_window: Vec<u64>,
    pub percentiles: Percentiles,
    pub uptime: Option<f64>,
    pub stability: Option<f64>,
    pub ssl_valid: bool,
    pub ssl_days_remaining: i64,
    pub health: Option<HealthVerdict>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Target {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Composite result of one check, written once per target per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    pub target_id: i64,
    pub status: ProbeOutcome,
    pub latency_ms: u64,
    pub latency_window: Vec<u64>,
    pub uptime: f64,
    pub stability: f64,
    pub percentiles: Percentiles,
    pub ssl_valid: bool,
    pub ssl_days_remaining: i64,
    pub health: HealthVerdict,
    pub checked_at: DateTime<Utc>,
}
