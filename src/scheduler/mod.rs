//! Scheduler that runs a check batch over all targets on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::MemoryCache;
use crate::db::SqliteStore;
use crate::monitor::Monitor;

/// Drives [`Monitor::run_batch`] every `interval`.
pub struct Scheduler {
    store: Arc<SqliteStore>,
    monitor: Monitor,
    cache: Arc<MemoryCache>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<SqliteStore>,
        monitor: Monitor,
        cache: Arc<MemoryCache>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            monitor,
            cache,
            interval,
        }
    }

    /// Start the scheduler loop. It stops once `shutdown` is cancelled,
    /// aborting any batch in flight.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Starting scheduler, interval {:?}", self.interval);

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.run_cycle(&shutdown).await;
                    }
                }
            }

            tracing::info!("Scheduler stopped");
        })
    }

    /// Run one batch over every stored target.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) {
        let targets = match self.store.get_targets() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("Scheduler: Failed to get targets: {}", e);
                return;
            }
        };

        if targets.is_empty() {
            tracing::debug!("Scheduler: no targets to check");
        } else {
            let batch_cancel = shutdown.child_token();
            self.monitor.run_batch(targets, &batch_cancel).await;
        }

        let purged = self.cache.purge_expired().await;
        if purged > 0 {
            tracing::debug!(purged, "Scheduler: purged expired metric state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Target;
    use crate::metrics::MetricsAggregator;
    use crate::probe::{CertificateProbe, HttpProbe, ProbeOutcome, ProbeSample, TlsStatus};
    use async_trait::async_trait;
    use tempfile::NamedTempFile;

    struct AlwaysUp;

    #[async_trait]
    impl HttpProbe for AlwaysUp {
        async fn probe(&self, _url: &str, _cancel: &CancellationToken) -> ProbeSample {
            ProbeSample {
                elapsed_ms: 12,
                outcome: ProbeOutcome::Up,
            }
        }
    }

    #[async_trait]
    impl CertificateProbe for AlwaysUp {
        async fn validate(&self, _host: &str, _cancel: &CancellationToken) -> TlsStatus {
            TlsStatus {
                valid: true,
                days_remaining: 365,
            }
        }
    }

    fn scheduler(tmp: &NamedTempFile, interval: Duration) -> (Scheduler, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::new(tmp.path()).unwrap());
        let cache = Arc::new(MemoryCache::new());
        let monitor = Monitor::new(
            Arc::new(AlwaysUp),
            Arc::new(AlwaysUp),
            MetricsAggregator::new(cache.clone(), None),
            store.clone(),
            2,
            10,
        );
        (Scheduler::new(store.clone(), monitor, cache, interval), store)
    }

    #[tokio::test]
    async fn test_cycle_updates_every_target() {
        let tmp = NamedTempFile::new().unwrap();
        let (scheduler, store) = scheduler(&tmp, Duration::from_secs(60));
        for i in 0..3 {
            store
                .add_target(&mut Target::new(format!("s{}", i), format!("https://s{}.example", i)))
                .unwrap();
        }

        scheduler.run_cycle(&CancellationToken::new()).await;

        for target in store.get_targets().unwrap() {
            assert_eq!(target.last_status, Some(ProbeOutcome::Up));
            assert_eq!(target.latency_window, vec![12]);
            assert_eq!(target.ssl_days_remaining, 365);
        }
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let tmp = NamedTempFile::new().unwrap();
        let (scheduler, store) = scheduler(&tmp, Duration::from_millis(20));
        store
            .add_target(&mut Target::new("s", "https://s.example"))
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = scheduler.start(shutdown.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        let target = &store.get_targets().unwrap()[0];
        assert!(target.latency_window.len() >= 2);
    }
}
