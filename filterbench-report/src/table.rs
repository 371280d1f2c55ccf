//! Plain-Text Output
//!
//! Terminal rendering of the scaling table, the per-run breakdown printed
//! after each worker count, and the serial timing summary.

use crate::outcome::RunOutcome;
use crate::report::BenchmarkReport;
use crate::timing::TimingSummary;
use std::fmt::Write;

const RULE_WIDTH: usize = 60;

fn ratio(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "n/a".to_string(),
    }
}

fn percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "n/a".to_string(),
    }
}

/// Summary table, one row per worker count in ascending order.
pub fn format_summary_table(report: &BenchmarkReport) -> String {
    let mut out = String::new();
    let rule = "-".repeat(RULE_WIDTH);

    writeln!(out).ok();
    writeln!(
        out,
        "{} SCALING SUMMARY (baseline {:.4}s, {} items)",
        report.strategy.to_uppercase(),
        report.baseline_seconds,
        report.batch_size
    )
    .ok();
    writeln!(out, "{}", rule).ok();
    writeln!(
        out,
        "{:<10} | {:<15} | {:<15} | {}",
        "Workers", "Time (s)", "Speedup (x)", "Efficiency"
    )
    .ok();
    writeln!(out, "{}", rule).ok();

    for row in report.rows() {
        writeln!(
            out,
            "{:<10} | {:<15.4} | {:<15} | {}",
            row.worker_count,
            row.duration_seconds,
            ratio(row.speedup),
            percent(row.efficiency)
        )
        .ok();
    }
    writeln!(out, "{}", "=".repeat(RULE_WIDTH)).ok();

    out
}

/// Breakdown printed after a single run: timing, counts and worker load.
pub fn format_run_block(outcome: &RunOutcome) -> String {
    let mut out = String::new();

    writeln!(out, "   Time: {:.4} seconds", outcome.duration_seconds).ok();
    writeln!(
        out,
        "   [Stats] Success: {} | Failed: {}",
        outcome.success_count, outcome.failure_count
    )
    .ok();
    writeln!(out, "   [Load Balancing] Worker breakdown:").ok();
    for (worker, count) in &outcome.load_distribution {
        writeln!(out, "      - Worker {}: processed {} images", worker, count).ok();
    }

    out
}

/// Per-item timing summary of a serial run
pub fn format_timing_summary(summary: &TimingSummary) -> String {
    format!(
        "   Per item ({} timed): total {:.4}s | mean {:.4}s | median {:.4}s | p95 {:.4}s | min {:.4}s | max {:.4}s\n",
        summary.count,
        summary.total,
        summary.mean,
        summary.median,
        summary.p95,
        summary.min,
        summary.max
    )
}
