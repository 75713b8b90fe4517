//! sitewatch - site health monitoring service.

use sitewatch::db::{SqliteStore, Target};
use sitewatch::metrics::MetricsAggregator;
use sitewatch::monitor::Monitor;
use sitewatch::probe::{Prober, TlsValidator};
use sitewatch::scheduler::Scheduler;
use sitewatch::web::{AppState, Server};
use sitewatch::{MemoryCache, MonitorConfig};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("sitewatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = MonitorConfig::load()?;
    tracing::info!("Starting sitewatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(SqliteStore::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Add sample target if none exist
    if store.get_targets()?.is_empty() {
        tracing::info!("Adding sample target: example.com");
        store.add_target(&mut Target::new("Example", "https://example.com"))?;
    }

    // Wire the engine
    let cache = Arc::new(MemoryCache::new());
    let monitor = Monitor::new(
        Arc::new(Prober::new(cfg.http_timeout)?),
        Arc::new(TlsValidator::new()),
        MetricsAggregator::new(cache.clone(), cfg.state_ttl()),
        store.clone(),
        cfg.max_concurrent_checks,
        cfg.latency_window_size,
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        });
    }

    // Start scheduler
    let scheduler = Scheduler::new(store.clone(), monitor.clone(), cache, cfg.check_interval)
        .start(shutdown.clone());

    // Start API server
    let server = Server::new(
        cfg.http_port,
        AppState {
            store,
            monitor,
            shutdown: shutdown.clone(),
        },
    );
    let served = server.start().await;

    shutdown.cancel();
    scheduler.await?;
    served
}
