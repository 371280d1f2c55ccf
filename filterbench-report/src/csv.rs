//! CSV Encoders
//!
//! Two small tables written next to the benchmark outputs:
//! - the per-item detail log (`filename,duration_seconds,status,worker_id`),
//!   kept in insertion order
//! - the metric record store (`metric,value`), which carries the serial
//!   baseline between independently invoked runs

use filterbench_ipc::WorkerId;
use std::collections::BTreeMap;
use thiserror::Error;

const DETAIL_HEADER: &str = "filename,duration_seconds,status,worker_id";
const METRIC_HEADER: &str = "metric,value";

/// One line of the per-item detail log
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRow {
    /// Output identifier of the item
    pub filename: String,
    /// Time spent on this item
    pub duration_seconds: f64,
    /// `Success` or `Error`
    pub status: String,
    /// Worker that handled the item
    pub worker: WorkerId,
}

/// Errors reading a metric record store
#[derive(Debug, Error, PartialEq)]
pub enum MetricParseError {
    /// Record does not have exactly two fields
    #[error("line {line}: expected `metric,value`, got {content:?}")]
    MalformedLine {
        /// 1-based line number
        line: usize,
        /// Offending line
        content: String,
    },

    /// Value field is not a number
    #[error("line {line}: value for {metric:?} is not a number: {value:?}")]
    InvalidValue {
        /// 1-based line number
        line: usize,
        /// Metric name
        metric: String,
        /// Offending value
        value: String,
    },
}

/// Quote a field if it contains a delimiter, quote or line break
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Encode the detail log, header first, rows in the given order
pub fn generate_detail_csv(rows: &[DetailRow]) -> String {
    let mut out = String::with_capacity(64 * (rows.len() + 1));
    out.push_str(DETAIL_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&format!(
            "{},{:.6},{},{}\n",
            escape_field(&row.filename),
            row.duration_seconds,
            escape_field(&row.status),
            row.worker
        ));
    }
    out
}

/// Encode a metric record store
pub fn generate_metric_csv(metrics: &BTreeMap<String, f64>) -> String {
    let mut out = String::from(METRIC_HEADER);
    out.push('\n');
    for (name, value) in metrics {
        out.push_str(&format!("{},{}\n", escape_field(name), value));
    }
    out
}

/// Split one CSV record into fields, honoring double-quoted fields
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Parse a metric record store. A leading `metric,value` header is skipped;
/// later records override earlier ones with the same name.
pub fn parse_metric_csv(content: &str) -> Result<BTreeMap<String, f64>, MetricParseError> {
    let mut metrics = BTreeMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || (idx == 0 && line == METRIC_HEADER) {
            continue;
        }

        let fields = split_record(line);
        let [name, value] = fields.as_slice() else {
            return Err(MetricParseError::MalformedLine {
                line: idx + 1,
                content: line.to_string(),
            });
        };

        let parsed = value
            .trim()
            .parse::<f64>()
            .map_err(|_| MetricParseError::InvalidValue {
                line: idx + 1,
                metric: name.trim().to_string(),
                value: value.trim().to_string(),
            })?;
        metrics.insert(name.trim().to_string(), parsed);
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain.png"), "plain.png");
        assert_eq!(escape_field("a,b.png"), "\"a,b.png\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_detail_csv_keeps_insertion_order() {
        let rows = vec![
            DetailRow {
                filename: "z.png".into(),
                duration_seconds: 0.5,
                status: "Success".into(),
                worker: WorkerId::Known(7),
            },
            DetailRow {
                filename: "a,1.png".into(),
                duration_seconds: 0.25,
                status: "Error".into(),
                worker: WorkerId::Known(7),
            },
        ];
        let csv = generate_detail_csv(&rows);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "filename,duration_seconds,status,worker_id");
        assert_eq!(lines[1], "z.png,0.500000,Success,7");
        assert_eq!(lines[2], "\"a,1.png\",0.250000,Error,7");
    }

    #[test]
    fn test_metric_store_reads_what_it_writes() {
        let metrics = BTreeMap::from([("serial_baseline".to_string(), 34.8712)]);
        let parsed = parse_metric_csv(&generate_metric_csv(&metrics)).unwrap();
        assert_eq!(parsed, metrics);
    }

    #[test]
    fn test_metric_store_without_header_and_with_blank_lines() {
        let parsed = parse_metric_csv("serial_baseline, 12.5\n\nother,1\n").unwrap();
        assert_eq!(parsed["serial_baseline"], 12.5);
        assert_eq!(parsed["other"], 1.0);
    }

    #[test]
    fn test_metric_store_errors() {
        assert_eq!(
            parse_metric_csv("metric,value\nserial_baseline\n"),
            Err(MetricParseError::MalformedLine {
                line: 2,
                content: "serial_baseline".into()
            })
        );
        assert!(matches!(
            parse_metric_csv("serial_baseline,fast"),
            Err(MetricParseError::InvalidValue { line: 1, .. })
        ));
    }
}
