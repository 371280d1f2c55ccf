//! JSON Output

use crate::report::{BenchmarkReport, ScalingRow};
use serde::Serialize;

/// Report plus its derived rows, as written to disk
#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a BenchmarkReport,
    rows: Vec<ScalingRow>,
}

/// Generate a prettified JSON report.
///
/// Derived rows are computed at serialization time; undefined ratios are
/// written as `null`.
pub fn generate_json_report(report: &BenchmarkReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonReport {
        report,
        rows: report.rows(),
    })
}
