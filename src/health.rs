//! Health classification of a target from its latest metrics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::probe::ProbeOutcome;

/// Uptime below this is critical.
pub const CRITICAL_UPTIME: f64 = 95.0;
/// Uptime or stability below this is a warning.
pub const WARNING_THRESHOLD: f64 = 99.5;
/// Certificates closer than this to expiry are a warning.
pub const SSL_WARNING_DAYS: i64 = 30;

/// Tri-level health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthVerdict {
    Healthy,
    Warning,
    Critical,
}

impl HealthVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthVerdict::Healthy => "healthy",
            HealthVerdict::Warning => "warning",
            HealthVerdict::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthVerdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(HealthVerdict::Healthy),
            "warning" => Ok(HealthVerdict::Warning),
            "critical" => Ok(HealthVerdict::Critical),
            other => Err(format!("unknown health verdict: {}", other)),
        }
    }
}

/// Inputs to [`classify`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInputs {
    pub last_status: ProbeOutcome,
    pub uptime: f64,
    pub stability: f64,
    pub ssl_days_remaining: i64,
}

/// First matching rule wins: status/uptime critical, then warnings.
pub fn classify(inputs: &HealthInputs) -> HealthVerdict {
    if !inputs.last_status.is_up() || inputs.uptime < CRITICAL_UPTIME {
        return HealthVerdict::Critical;
    }

    if inputs.uptime < WARNING_THRESHOLD
        || inputs.stability < WARNING_THRESHOLD
        || inputs.ssl_days_remaining < SSL_WARNING_DAYS
    {
        return HealthVerdict::Warning;
    }

    HealthVerdict::Healthy
}
