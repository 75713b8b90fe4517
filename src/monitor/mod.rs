//! Check orchestration.
//!
//! A batch runs every target's pipeline as its own task, admitted through a
//! semaphore so at most `max_concurrent_checks` pipelines run at once.
//! On-demand checks skip the semaphore entirely; while a batch is saturated
//! they can push concurrency above the cap.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheError;
use crate::db::{DbError, MetricsUpdate, Repository, Target};
use crate::health::{classify, HealthInputs};
use crate::metrics::{MetricsAggregator, Percentiles};
use crate::probe::{CertificateProbe, HttpProbe};

/// Errors that abort a single target's pipeline.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("metrics store error: {0}")]
    Cache(#[from] CacheError),
    #[error("repository error: {0}")]
    Repository(#[from] DbError),
}

/// Result of a completed check; identical to what was persisted.
pub type CheckReport = MetricsUpdate;

/// Per-batch tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub checked: usize,
    pub failed: usize,
    /// Never started because the batch was cancelled first.
    pub skipped: usize,
}

enum TaskOutcome {
    Checked,
    Failed,
    Skipped,
}

/// Runs target checks and persists their results.
#[derive(Clone)]
pub struct Monitor {
    prober: Arc<dyn HttpProbe>,
    tls: Arc<dyn CertificateProbe>,
    metrics: MetricsAggregator,
    repository: Arc<dyn Repository>,
    gate: Arc<Semaphore>,
    window_size: usize,
}

impl Monitor {
    pub fn new(
        prober: Arc<dyn HttpProbe>,
        tls: Arc<dyn CertificateProbe>,
        metrics: MetricsAggregator,
        repository: Arc<dyn Repository>,
        max_concurrent_checks: usize,
        window_size: usize,
    ) -> Self {
        Self {
            prober,
            tls,
            metrics,
            repository,
            gate: Arc::new(Semaphore::new(max_concurrent_checks.min(Semaphore::MAX_PERMITS))),
            window_size,
        }
    }

    /// Permits currently free in the batch gate.
    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    /// Check every target, at most `max_concurrent_checks` at a time.
    ///
    /// A failing target never aborts the others. Once `cancel` fires,
    /// targets still waiting for admission are skipped and in-flight
    /// pipelines finish with the outcome their aborted probe produced.
    pub async fn run_batch(&self, targets: Vec<Target>, cancel: &CancellationToken) -> BatchSummary {
        tracing::info!(targets = targets.len(), "starting check batch");

        let mut tasks = JoinSet::new();
        for target in targets {
            let monitor = self.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return TaskOutcome::Skipped,
                    permit = monitor.gate.clone().acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return TaskOutcome::Skipped,
                    },
                };
                // Dropped on every exit path, including panics and aborts.
                let _permit = permit;

                match monitor.check_target(&target, &cancel).await {
                    Ok(_) => TaskOutcome::Checked,
                    Err(e) => {
                        tracing::error!(
                            target_id = target.id,
                            url = %target.url,
                            error = %e,
                            "check failed, skipping persistence this cycle"
                        );
                        TaskOutcome::Failed
                    }
                }
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskOutcome::Checked) => summary.checked += 1,
                Ok(TaskOutcome::Failed) => summary.failed += 1,
                Ok(TaskOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!(error = %e, "check task did not complete");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            checked = summary.checked,
            failed = summary.failed,
            skipped = summary.skipped,
            "check batch finished"
        );
        summary
    }

    /// Check one target immediately, outside the batch gate.
    pub async fn check_now(
        &self,
        target: &Target,
        cancel: &CancellationToken,
    ) -> Result<CheckReport, MonitorError> {
        self.check_target(target, cancel).await
    }

    /// Probe, validate TLS, aggregate, classify, persist. Strictly in order.
    async fn check_target(
        &self,
        target: &Target,
        cancel: &CancellationToken,
    ) -> Result<CheckReport, MonitorError> {
        let sample = self.prober.probe(&target.url, cancel).await;
        let tls = self.tls.validate(&target.url, cancel).await;

        let window = self
            .metrics
            .record_sample(target.id, sample.elapsed_ms, sample.outcome, self.window_size)
            .await?;
        let percentiles = Percentiles::from_window(&window);
        let uptime = self.metrics.uptime(target.id, sample.outcome).await?;
        let stability = self.metrics.stability(target.id).await?;

        let health = classify(&HealthInputs {
            last_status: sample.outcome,
            uptime,
            stability,
            ssl_days_remaining: tls.days_remaining,
        });

        let update = MetricsUpdate {
            target_id: target.id,
            status: sample.outcome,
            latency_ms: sample.elapsed_ms,
            latency_window: window,
            uptime,
            stability,
            percentiles,
            ssl_valid: tls.valid,
            ssl_days_remaining: tls.days_remaining,
            health,
            checked_at: Utc::now(),
        };
        self.repository.update_metrics(&update).await?;

        tracing::debug!(
            target_id = target.id,
            status = %update.status,
            latency_ms = update.latency_ms,
            health = %update.health,
            "target checked"
        );
        Ok(update)
    }
}
