//! Nearest-rank percentiles over a latency window.

use serde::{Deserialize, Serialize};

/// Latency percentiles in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
}

impl Percentiles {
    /// Compute p50/p90/p95/p99 from an unsorted window.
    ///
    /// An empty window yields all zeros.
    pub fn from_window(window: &[u64]) -> Self {
        let mut sorted = window.to_vec();
        sorted.sort_unstable();
        Self {
            p50: nearest_rank(&sorted, 50.0),
            p90: nearest_rank(&sorted, 90.0),
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        }
    }
}

/// Nearest-rank percentile of an ascending slice.
///
/// Index = ceil(p / 100 * n) - 1, clamped to the slice. No interpolation.
pub fn nearest_rank(sorted: &[u64], p: f64) -> u64 {
    let n = sorted.len();
    if n == 0 {
        return 0;
    }

    // Multiply before dividing so integral p * n stays exact.
    let rank = (p * n as f64 / 100.0).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    sorted[index]
}
