//! sitewatch - site health monitoring engine.
//!
//! Probes registered targets over HTTP and TLS, keeps rolling latency,
//! uptime and stability metrics in a counter store, classifies each target's
//! health and writes the result through a repository.

pub mod cache;
pub mod config;
pub mod db;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod probe;
pub mod scheduler;
pub mod web;

pub use cache::{CacheError, CacheStore, CacheValue, MemoryCache};
pub use config::{ConfigError, MonitorConfig};
pub use db::{DbError, MetricsUpdate, Repository, SqliteStore, Target};
pub use health::{classify, HealthInputs, HealthVerdict};
pub use metrics::{MetricsAggregator, Percentiles};
pub use monitor::{BatchSummary, CheckReport, Monitor, MonitorError};
pub use probe::{
    CertificateProbe, HttpProbe, ProbeOutcome, ProbeSample, Prober, TlsStatus, TlsValidator,
};
