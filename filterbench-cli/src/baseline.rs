//! Baseline Store
//!
//! The serial baseline is measured once and read back by later, separately
//! invoked parallel runs. It lives in a small `metric,value` CSV record store
//! next to the outputs, alongside the serial run's per-item detail log.

use filterbench_report::{
    DetailRow, MetricParseError, generate_detail_csv, generate_metric_csv, parse_metric_csv,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Metric name of the serial baseline duration (seconds)
pub const BASELINE_METRIC: &str = "serial_baseline";

/// Errors reading or writing the record store
#[derive(Debug, Error)]
pub enum BaselineError {
    /// The store file does not exist
    #[error("baseline file {} not found; run `filterbench serial` first", path.display())]
    Missing {
        /// Expected location
        path: PathBuf,
    },

    /// The store exists but lacks the record
    #[error("baseline file {} has no `{metric}` record", path.display())]
    NotRecorded {
        /// Store location
        path: PathBuf,
        /// Missing metric
        metric: String,
    },

    /// The recorded value cannot serve as a baseline
    #[error("baseline of {value} seconds is not a positive, finite duration")]
    Invalid {
        /// Rejected value
        value: f64,
    },

    /// Reading or writing failed
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The store is not a valid record file
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// Store location
        path: PathBuf,
        /// Underlying error
        #[source]
        source: MetricParseError,
    },
}

/// Reject baselines no speedup can be computed against
pub fn validate_baseline(value: f64) -> Result<f64, BaselineError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(BaselineError::Invalid { value })
    }
}

/// Metric record store backed by one CSV file
#[derive(Debug, Clone)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    /// Store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in the store
    pub fn load_all(&self) -> Result<BTreeMap<String, f64>, BaselineError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BaselineError::Missing {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Err(BaselineError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        parse_metric_csv(&content).map_err(|source| BaselineError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// One record by name
    pub fn get(&self, metric: &str) -> Result<f64, BaselineError> {
        self.load_all()?
            .get(metric)
            .copied()
            .ok_or_else(|| BaselineError::NotRecorded {
                path: self.path.clone(),
                metric: metric.to_string(),
            })
    }

    /// The serial baseline, validated
    pub fn baseline(&self) -> Result<f64, BaselineError> {
        validate_baseline(self.get(BASELINE_METRIC)?)
    }

    /// Write one record, keeping any other records already in the store
    pub fn set(&self, metric: &str, value: f64) -> Result<(), BaselineError> {
        let mut records = match self.load_all() {
            Ok(records) => records,
            Err(BaselineError::Missing { .. }) => BTreeMap::new(),
            Err(BaselineError::Parse { .. }) => {
                tracing::warn!(path = %self.path.display(), "replacing unreadable baseline store");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        records.insert(metric.to_string(), value);
        write_file(&self.path, &generate_metric_csv(&records))
    }

    /// Persist the serial baseline
    pub fn save_baseline(&self, seconds: f64) -> Result<(), BaselineError> {
        self.set(BASELINE_METRIC, validate_baseline(seconds)?)
    }
}

/// Write the per-item detail log
pub fn write_detail_log(path: &Path, rows: &[DetailRow]) -> Result<(), BaselineError> {
    write_file(path, &generate_detail_csv(rows))
}

fn write_file(path: &Path, content: &str) -> Result<(), BaselineError> {
    let io_err = |source| BaselineError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, content).map_err(io_err)
}
