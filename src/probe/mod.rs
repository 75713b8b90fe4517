//! Probe module for target monitoring.
//!
//! Supports a plain HTTP availability probe and a TLS certificate probe.

mod http;
mod tls;

pub use http::*;
pub use tls::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Probe error types.
///
/// Only raised while building a probe; individual probe failures are
/// folded into [`ProbeOutcome::Error`] instead.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Tri-state result of a single HTTP probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// 2xx or 3xx response.
    Up,
    /// Any other response status.
    Down,
    /// Network failure, timeout or cancellation.
    Error,
}

impl ProbeOutcome {
    pub fn is_up(self) -> bool {
        self == ProbeOutcome::Up
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeOutcome::Up => "up",
            ProbeOutcome::Down => "down",
            ProbeOutcome::Error => "error",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(ProbeOutcome::Up),
            "down" => Ok(ProbeOutcome::Down),
            "error" => Ok(ProbeOutcome::Error),
            other => Err(format!("unknown probe outcome: {}", other)),
        }
    }
}

/// Timing and outcome of one HTTP probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSample {
    /// Elapsed time in milliseconds, up to the failure point on errors.
    pub elapsed_ms: u64,
    pub outcome: ProbeOutcome,
}

/// Derived TLS state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TlsStatus {
    pub valid: bool,
    /// Whole days until the leaf certificate expires (negative once expired).
    pub days_remaining: i64,
}

impl TlsStatus {
    /// Result used whenever nothing useful could be learned.
    pub const INVALID: TlsStatus = TlsStatus {
        valid: false,
        days_remaining: 0,
    };
}

/// Issues one availability probe against a URL.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn probe(&self, url: &str, cancel: &CancellationToken) -> ProbeSample;
}

/// Validates the TLS certificate presented by a host.
#[async_trait]
pub trait CertificateProbe: Send + Sync {
    async fn validate(&self, host: &str, cancel: &CancellationToken) -> TlsStatus;
}
