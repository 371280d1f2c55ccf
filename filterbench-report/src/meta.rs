//! Report Metadata
//!
//! Host details captured alongside every report so results from different
//! machines are never compared blindly. Linux-specific data (CPU model,
//! memory) degrades to "Unknown" or 0 elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Report schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Metadata attached to a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// JSON schema version
    pub schema_version: u32,
    /// FilterBench version that produced the report
    pub version: String,
    /// UTC time the report was built
    pub timestamp: DateTime<Utc>,
    /// Host description
    pub system: SystemInfo,
}

/// Host description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system
    pub os: String,
    /// CPU architecture
    pub arch: String,
    /// CPU model name
    pub cpu: String,
    /// Logical cores available to this process
    pub cpu_cores: u32,
    /// Total RAM in GB
    pub memory_gb: f64,
}

impl ReportMeta {
    /// Capture metadata for the current host and time
    pub fn collect() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            system: SystemInfo::collect(),
        }
    }
}

impl SystemInfo {
    /// Describe the current host
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu: cpu_model().unwrap_or_else(|| "Unknown".to_string()),
            cpu_cores: available_cores(),
            memory_gb: memory_gb().unwrap_or(0.0),
        }
    }
}

fn cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn available_cores() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

fn memory_gb() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("MemTotal"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|kb| kb as f64 / 1024.0 / 1024.0)
            })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
