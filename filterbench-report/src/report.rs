//! Benchmark Report
//!
//! Ordered run outcomes plus the serial baseline. Speedup and efficiency are
//! never stored; they are recomputed from the durations every time a row is
//! asked for.
//!
//! A duration that is zero, negative or not finite has no meaningful speedup,
//! so both ratios are `None` (rendered `n/a`) for that row.

use crate::meta::ReportMeta;
use crate::outcome::RunOutcome;
use serde::{Deserialize, Serialize};

/// Efficiency above `1.0 + EFFICIENCY_TOLERANCE` is super-linear, which for a
/// CPU-bound workload points at a bad baseline measurement.
pub const EFFICIENCY_TOLERANCE: f64 = 0.05;

/// `baseline / duration`, or `None` when the ratio is undefined
pub fn speedup(baseline_seconds: f64, duration_seconds: f64) -> Option<f64> {
    if !baseline_seconds.is_finite() || !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return None;
    }
    Some(baseline_seconds / duration_seconds)
}

/// `speedup / worker_count`, or `None` when either is undefined
pub fn efficiency(speedup: Option<f64>, worker_count: usize) -> Option<f64> {
    if worker_count == 0 {
        return None;
    }
    speedup.map(|s| s / worker_count as f64)
}

/// One derived row of the scaling table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRow {
    /// Worker count
    pub worker_count: usize,
    /// Measured duration
    pub duration_seconds: f64,
    /// Serial baseline over this duration
    pub speedup: Option<f64>,
    /// Speedup per worker
    pub efficiency: Option<f64>,
}

impl ScalingRow {
    /// Whether efficiency exceeds the physically plausible bound
    pub fn is_superlinear(&self) -> bool {
        self.efficiency
            .is_some_and(|e| e > 1.0 + EFFICIENCY_TOLERANCE)
    }
}

/// All runs of one strategy against one baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Run metadata
    pub meta: ReportMeta,
    /// Strategy name (`serial`, `pool`, `futures`)
    pub strategy: String,
    /// Items in the batch
    pub batch_size: usize,
    /// Serial baseline duration
    pub baseline_seconds: f64,
    /// One outcome per worker count, ascending
    pub runs: Vec<RunOutcome>,
}

impl BenchmarkReport {
    /// Build a report; runs are ordered by ascending worker count.
    pub fn new(
        strategy: impl Into<String>,
        batch_size: usize,
        baseline_seconds: f64,
        mut runs: Vec<RunOutcome>,
    ) -> Self {
        runs.sort_by_key(|run| run.worker_count);
        Self {
            meta: ReportMeta::collect(),
            strategy: strategy.into(),
            batch_size,
            baseline_seconds,
            runs,
        }
    }

    /// Scaling rows, recomputed from the stored durations
    pub fn rows(&self) -> Vec<ScalingRow> {
        self.runs
            .iter()
            .map(|run| {
                let speedup = speedup(self.baseline_seconds, run.duration_seconds);
                ScalingRow {
                    worker_count: run.worker_count,
                    duration_seconds: run.duration_seconds,
                    speedup,
                    efficiency: efficiency(speedup, run.worker_count),
                }
            })
            .collect()
    }

    /// Rows whose efficiency is implausibly high
    pub fn superlinear_rows(&self) -> Vec<ScalingRow> {
        self.rows()
            .into_iter()
            .filter(ScalingRow::is_superlinear)
            .collect()
    }

    /// Total failed items across all runs
    pub fn total_failures(&self) -> usize {
        self.runs.iter().map(|run| run.failure_count).sum()
    }
}
