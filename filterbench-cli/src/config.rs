//! Configuration loading from filterbench.toml
//!
//! FilterBench configuration can be specified in a `filterbench.toml` file in
//! the project root. The file is discovered by walking up from the current
//! directory; every field has a default, and CLI flags override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up by [`FilterConfig::discover`]
pub const CONFIG_FILE_NAME: &str = "filterbench.toml";

/// FilterBench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterConfig {
    /// Input batch configuration
    #[serde(default)]
    pub input: InputConfig,
    /// Output locations
    #[serde(default)]
    pub output: OutputConfig,
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Isolation mode for worker execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// Each worker is a separate OS process (default)
    #[default]
    Process,
    /// Each worker is a thread in the supervisor process (no isolation)
    Thread,
}

impl IsolationMode {
    /// Whether this mode provides process isolation
    pub fn is_isolated(self) -> bool {
        matches!(self, IsolationMode::Process)
    }
}

impl std::str::FromStr for IsolationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "process" => Ok(IsolationMode::Process),
            "thread" => Ok(IsolationMode::Thread),
            other => Err(format!(
                "Unknown isolation mode: {} (expected process or thread)",
                other
            )),
        }
    }
}

/// Input batch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Folder scanned recursively for images
    #[serde(default = "default_input_dir")]
    pub directory: PathBuf,
    /// File extensions treated as images
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            directory: default_input_dir(),
            extensions: default_extensions(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("input_images")
}
fn default_extensions() -> Vec<String> {
    filterbench_core::IMAGE_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}

/// Output locations, relative to `root` unless absolute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root folder for every output below
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
    /// Filtered images from the serial run
    #[serde(default = "default_serial_dir")]
    pub serial_dir: PathBuf,
    /// Filtered images from the pool runs
    #[serde(default = "default_pool_dir")]
    pub pool_dir: PathBuf,
    /// Filtered images from the futures runs
    #[serde(default = "default_futures_dir")]
    pub futures_dir: PathBuf,
    /// Filtered images from a baseline computed by the pool command
    #[serde(default = "default_baseline_run_dir")]
    pub baseline_run_dir: PathBuf,
    /// Metric record store holding the serial baseline
    #[serde(default = "default_baseline_file")]
    pub baseline_file: PathBuf,
    /// Per-item detail log of the serial run
    #[serde(default = "default_detail_log")]
    pub detail_log: PathBuf,
    /// Default report format: "human" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            serial_dir: default_serial_dir(),
            pool_dir: default_pool_dir(),
            futures_dir: default_futures_dir(),
            baseline_run_dir: default_baseline_run_dir(),
            baseline_file: default_baseline_file(),
            detail_log: default_detail_log(),
            format: default_format(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_serial_dir() -> PathBuf {
    PathBuf::from("output_serial")
}
fn default_pool_dir() -> PathBuf {
    PathBuf::from("output_multiprocessing")
}
fn default_futures_dir() -> PathBuf {
    PathBuf::from("output_concurrent")
}
fn default_baseline_run_dir() -> PathBuf {
    PathBuf::from("output_serial_bench")
}
fn default_baseline_file() -> PathBuf {
    PathBuf::from("serial_baseline_value.csv")
}
fn default_detail_log() -> PathBuf {
    PathBuf::from("serial_results.csv")
}
fn default_format() -> String {
    "human".to_string()
}

impl OutputConfig {
    /// Resolve `path` against the output root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Worker counts tried by the pool command
    #[serde(default = "default_pool_workers")]
    pub pool_workers: Vec<usize>,
    /// Worker counts tried by the futures command
    #[serde(default = "default_futures_workers")]
    pub futures_workers: Vec<usize>,
    /// Per-item timeout (e.g., "60s", "5m"); unset means wait indefinitely
    #[serde(default)]
    pub timeout: Option<String>,
    /// Isolation mode: "process" or "thread"
    #[serde(default)]
    pub isolation: IsolationMode,
    /// Chunks per worker used to size pool chunks
    #[serde(default = "default_chunks_per_worker")]
    pub chunks_per_worker: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pool_workers: default_pool_workers(),
            futures_workers: default_futures_workers(),
            timeout: None,
            isolation: IsolationMode::default(),
            chunks_per_worker: default_chunks_per_worker(),
        }
    }
}

fn default_pool_workers() -> Vec<usize> {
    vec![1, 2, 4, 8]
}
fn default_futures_workers() -> Vec<usize> {
    vec![2, 4, 8]
}
fn default_chunks_per_worker() -> usize {
    4
}

impl RunnerConfig {
    /// Parsed per-item timeout
    pub fn timeout(&self) -> anyhow::Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|s| FilterConfig::parse_duration(s).map(Duration::from_nanos))
            .transpose()
    }
}

impl FilterConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory.
    ///
    /// Returns `Ok(None)` when no file exists; a file that exists but does not
    /// parse is an error.
    pub fn discover() -> anyhow::Result<Option<Self>> {
        let mut dir = std::env::current_dir()?;
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path)
                    .map(Some)
                    .map_err(|e| anyhow::anyhow!("{}: {}", config_path.display(), e));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# FilterBench Configuration
# https://github.com/ml-rust/filterbench

[input]
# Folder scanned recursively for images
directory = "input_images"
# Extensions treated as images (case-insensitive)
extensions = ["png", "jpg", "jpeg"]

[output]
# Root folder for all outputs below
root = "."
# Filtered images per strategy
serial_dir = "output_serial"
pool_dir = "output_multiprocessing"
futures_dir = "output_concurrent"
# Filtered images when `pool --compute-baseline` runs the serial pass itself
baseline_run_dir = "output_serial_bench"
# Serial baseline record store and per-item detail log
baseline_file = "serial_baseline_value.csv"
detail_log = "serial_results.csv"
# Report format: human or json
format = "human"

[runner]
# Worker counts tried by each strategy
pool_workers = [1, 2, 4, 8]
futures_workers = [2, 4, 8]
# Per-item timeout (uncomment to enable)
# timeout = "60s"
# Isolation mode: "process" or "thread"
isolation = "process"
# Pool chunk size is len / (workers * chunks_per_worker), rounded up
chunks_per_worker = 4
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow::anyhow!("Invalid duration: {}", s));
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok((value * multiplier as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FilterConfig::default();
        assert_eq!(config.input.directory, PathBuf::from("input_images"));
        assert_eq!(config.runner.pool_workers, vec![1, 2, 4, 8]);
        assert_eq!(config.runner.futures_workers, vec![2, 4, 8]);
        assert_eq!(config.runner.isolation, IsolationMode::Process);
        assert_eq!(config.runner.timeout().unwrap(), None);
        assert_eq!(
            config.output.resolve(&config.output.baseline_file),
            PathBuf::from("./serial_baseline_value.csv")
        );
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(FilterConfig::parse_duration("3s").unwrap(), 3_000_000_000);
        assert_eq!(FilterConfig::parse_duration("500ms").unwrap(), 500_000_000);
        assert_eq!(FilterConfig::parse_duration("100us").unwrap(), 100_000);
        assert_eq!(FilterConfig::parse_duration("1000ns").unwrap(), 1000);
        assert_eq!(FilterConfig::parse_duration("2m").unwrap(), 120_000_000_000);
        assert_eq!(FilterConfig::parse_duration("1.5s").unwrap(), 1_500_000_000);
        assert_eq!(FilterConfig::parse_duration("10").unwrap(), 10_000_000_000);
        assert!(FilterConfig::parse_duration("").is_err());
        assert!(FilterConfig::parse_duration("5h").is_err());
        assert!(FilterConfig::parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [runner]
            pool_workers = [2, 6]
            timeout = "250ms"
            isolation = "thread"

            [output]
            root = "/tmp/bench"
        "#;

        let config: FilterConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runner.pool_workers, vec![2, 6]);
        assert_eq!(config.runner.isolation, IsolationMode::Thread);
        assert_eq!(
            config.runner.timeout().unwrap(),
            Some(Duration::from_millis(250))
        );
        // Defaults should still apply
        assert_eq!(config.runner.futures_workers, vec![2, 4, 8]);
        assert_eq!(config.runner.chunks_per_worker, 4);
        assert_eq!(
            config.output.resolve(&config.output.detail_log),
            PathBuf::from("/tmp/bench/serial_results.csv")
        );
    }

    #[test]
    fn test_default_toml_parses() {
        let config: FilterConfig = toml::from_str(&FilterConfig::default_toml()).unwrap();
        assert_eq!(config.output.pool_dir, PathBuf::from("output_multiprocessing"));
        assert_eq!(config.input.extensions, vec!["png", "jpg", "jpeg"]);
    }

    #[test]
    fn test_isolation_from_str() {
        assert_eq!("Thread".parse::<IsolationMode>().unwrap(), IsolationMode::Thread);
        assert!("in-process".parse::<IsolationMode>().is_err());
        assert!(IsolationMode::Process.is_isolated());
    }
}
