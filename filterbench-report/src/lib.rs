#![warn(missing_docs)]
//! FilterBench Report - Outcomes, Scaling Metrics and Output
//!
//! Folds per-item results into run outcomes, derives speedup and efficiency
//! against the serial baseline, and renders the results:
//! - Plain-text summary table and per-run breakdown (terminal)
//! - JSON (machine-readable)
//! - CSV encoders for the per-item detail log and the metric record store

mod csv;
mod json;
mod meta;
mod outcome;
mod report;
mod table;
mod timing;

pub use csv::{
    DetailRow, MetricParseError, escape_field, generate_detail_csv, generate_metric_csv,
    parse_metric_csv,
};
pub use json::generate_json_report;
pub use meta::{ReportMeta, SystemInfo};
pub use outcome::RunOutcome;
pub use report::{BenchmarkReport, EFFICIENCY_TOLERANCE, ScalingRow, efficiency, speedup};
pub use table::{format_run_block, format_summary_table, format_timing_summary};
pub use timing::{TimingSummary, percentile};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable terminal table
    Human,
    /// JSON with metadata, outcomes and scaling rows
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" | "table" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Human);
        assert!("html".parse::<OutputFormat>().is_err());
    }
}
