//! HTTP availability probe implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{HttpProbe, ProbeError, ProbeOutcome, ProbeSample};

/// Build the shared HTTP client used for availability probes.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("sitewatch/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Availability prober issuing one GET per call.
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
}

impl Prober {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        Ok(Self {
            client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl HttpProbe for Prober {
    /// Run an HTTP probe against the given URL.
    ///
    /// Only the response head is awaited; the body is dropped unread.
    async fn probe(&self, url: &str, cancel: &CancellationToken) -> ProbeSample {
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = self.client.get(url).send() => Some(r),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Some(Ok(response)) => {
                let status = response.status();
                if status.is_success() || status.is_redirection() {
                    ProbeOutcome::Up
                } else {
                    tracing::warn!(url, status = status.as_u16(), "probe returned non-success status");
                    ProbeOutcome::Down
                }
            }
            Some(Err(e)) => {
                if e.is_timeout() {
                    tracing::warn!(url, elapsed_ms, "probe timed out");
                } else {
                    tracing::warn!(url, error = %e, "probe failed");
                }
                ProbeOutcome::Error
            }
            None => {
                tracing::warn!(url, elapsed_ms, "probe cancelled");
                ProbeOutcome::Error
            }
        };

        ProbeSample {
            elapsed_ms,
            outcome,
        }
    }
}
