// src/stats.rs
//
//! Per-cycle latency and error statistics.
//!
//! Percentiles use the nearest-rank definition: sort ascending and take the
//! value at index `ceil(p/100 * count) - 1` (clamped to 0). No interpolation,
//! so the result is always one of the recorded samples. An empty sample set
//! yields `0.0`.

use serde::Serialize;

use crate::constants::REPORTED_PERCENTILE;

/// Nearest-rank percentile of `values` (`pct` in `0..=100`).
pub fn percentile_nearest_rank(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

/// p95 over inference latencies (milliseconds).
pub fn p95_latency_ms(latencies_ms: &[f64]) -> f64 {
    percentile_nearest_rank(latencies_ms, REPORTED_PERCENTILE)
}

/// `100 * failures / max(1, count)`.
pub fn error_rate_percent(successes: &[bool]) -> f64 {
    let failures = successes.iter().filter(|ok| !**ok).count();
    failures as f64 * 100.0 / successes.len().max(1) as f64
}

/// Aggregated view of one cycle's inference samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleStats {
    pub p95_latency_ms: f64,
    pub error_rate_percent: f64,
    pub successes: usize,
    pub failures: usize,
}

impl CycleStats {
    /// Reduce parallel latency/success sequences. Both must describe the same samples.
    pub fn compute(latencies_ms: &[f64], successes: &[bool]) -> Self {
        debug_assert_eq!(latencies_ms.len(), successes.len());
        let ok = successes.iter().filter(|s| **s).count();
        Self {
            p95_latency_ms: p95_latency_ms(latencies_ms),
            error_rate_percent: error_rate_percent(successes),
            successes: ok,
            failures: successes.len() - ok,
        }
    }

    /// All samples failed (and there was at least one).
    pub fn total_outage(&self) -> bool {
        self.successes == 0 && self.failures > 0
    }
}
