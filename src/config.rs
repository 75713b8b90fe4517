//! Configuration module for sitewatch.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Invalid values are rejected at startup rather than silently replaced.

use std::env;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

/// Configuration error types.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{key} must be at most {max}")]
    TooLarge { key: &'static str, max: usize },
}

/// Monitor configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// HTTP port for the API server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "sitewatch.db")
    pub db_path: String,
    /// Upper bound on concurrently running checks in a batch (default: 10)
    pub max_concurrent_checks: usize,
    /// Latency samples kept per target (default: 100)
    pub latency_window_size: usize,
    /// Time between scheduled batches (default: 60s)
    pub check_interval: Duration,
    /// Timeout of the availability probe (default: 30s)
    pub http_timeout: Duration,
    /// Expiry of rolling per-target state after inactivity (default: 7 days)
    pub counter_ttl: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "sitewatch.db".to_string(),
            max_concurrent_checks: 10,
            latency_window_size: 100,
            check_interval: Duration::from_secs(60),
            http_timeout: Duration::from_secs(30),
            counter_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SITEWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `SITEWATCH_DB_PATH`: Database file path (default: "sitewatch.db")
    /// - `SITEWATCH_MAX_CONCURRENT_CHECKS`: batch concurrency cap (default: 10)
    /// - `SITEWATCH_LATENCY_WINDOW`: samples per target (default: 100)
    /// - `SITEWATCH_CHECK_INTERVAL_SECS`: seconds between batches (default: 60)
    /// - `SITEWATCH_HTTP_TIMEOUT_SECS`: probe timeout in seconds (default: 30)
    /// - `SITEWATCH_COUNTER_TTL_HOURS`: state expiry in hours (default: 168)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup.
    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse(&lookup, "SITEWATCH_HTTP_PORT")? {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("SITEWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(n) = parse(&lookup, "SITEWATCH_MAX_CONCURRENT_CHECKS")? {
            cfg.max_concurrent_checks = n;
        }

        if let Some(n) = parse(&lookup, "SITEWATCH_LATENCY_WINDOW")? {
            cfg.latency_window_size = n;
        }

        if let Some(secs) = parse(&lookup, "SITEWATCH_CHECK_INTERVAL_SECS")? {
            cfg.check_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = parse(&lookup, "SITEWATCH_HTTP_TIMEOUT_SECS")? {
            cfg.http_timeout = Duration::from_secs(secs);
        }

        if let Some(hours) = parse::<u64, _>(&lookup, "SITEWATCH_COUNTER_TTL_HOURS")? {
            let secs = hours.checked_mul(3600).ok_or(ConfigError::Invalid {
                key: "SITEWATCH_COUNTER_TTL_HOURS",
                value: hours.to_string(),
            })?;
            cfg.counter_ttl = Duration::from_secs(secs);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_checks == 0 {
            return Err(ConfigError::Zero("max_concurrent_checks"));
        }
        if self.max_concurrent_checks > Semaphore::MAX_PERMITS {
            return Err(ConfigError::TooLarge {
                key: "max_concurrent_checks",
                max: Semaphore::MAX_PERMITS,
            });
        }
        if self.latency_window_size == 0 {
            return Err(ConfigError::Zero("latency_window_size"));
        }
        if self.check_interval.is_zero() {
            return Err(ConfigError::Zero("check_interval"));
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::Zero("http_timeout"));
        }
        Ok(())
    }

    /// Expiry passed to the cache store; zero disables expiry.
    pub fn state_ttl(&self) -> Option<Duration> {
        (!self.counter_ttl.is_zero()).then_some(self.counter_ttl)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
