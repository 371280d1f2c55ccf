//! Per-Item Timing Summary
//!
//! Summary of the per-item durations recorded by the serial run. Percentiles
//! use linear interpolation between nearest ranks.

use serde::{Deserialize, Serialize};

/// Percentile of `samples` (0-100), or 0.0 for no samples
pub fn percentile(samples: &[f64], pct: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    if samples.len() == 1 {
        return samples[0];
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(n - 1);
    let fraction = rank - lower as f64;

    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}

/// Aggregate of per-item durations, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    /// Items timed
    pub count: usize,
    /// Sum of all durations
    pub total: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// 50th percentile
    pub median: f64,
    /// 95th percentile
    pub p95: f64,
    /// Fastest item
    pub min: f64,
    /// Slowest item
    pub max: f64,
}

impl TimingSummary {
    /// Summarize `durations`; `None` when there are none
    pub fn from_durations(durations: &[f64]) -> Option<Self> {
        if durations.is_empty() {
            return None;
        }
        let total: f64 = durations.iter().sum();
        Some(Self {
            count: durations.len(),
            total,
            mean: total / durations.len() as f64,
            median: percentile(durations, 50.0),
            p95: percentile(durations, 95.0),
            min: durations.iter().copied().fold(f64::INFINITY, f64::min),
            max: durations.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let samples = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(percentile(&samples, 50.0), 3.0);
        assert_eq!(percentile(&samples, 0.0), 1.0);
        assert_eq!(percentile(&samples, 100.0), 5.0);
        assert!((percentile(&samples, 95.0) - 4.8).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_edge_cases() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7.5], 99.0), 7.5);
    }

    #[test]
    fn test_summary() {
        let summary = TimingSummary::from_durations(&[0.5, 1.5, 1.0, 3.0]).unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.total, 6.0);
        assert_eq!(summary.mean, 1.5);
        assert_eq!(summary.median, 1.25);
        assert_eq!(summary.min, 0.5);
        assert_eq!(summary.max, 3.0);
        assert!(TimingSummary::from_durations(&[]).is_none());
    }
}
