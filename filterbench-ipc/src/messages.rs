//! IPC Message Types
//!
//! Everything here crosses the worker isolation boundary by value, serialized
//! with rkyv. None of these types hold handles or shared state.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// One independent unit of work: an image to transform and where the
/// transformed copies go.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkItem {
    /// Source image path
    pub source: String,
    /// Root output directory; transforms write into subfolders of it
    pub output_dir: String,
}

impl WorkItem {
    /// Create a work item from a source path and an output directory
    pub fn new(source: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Self {
        Self {
            source: source.as_ref().to_string_lossy().into_owned(),
            output_dir: output_dir.as_ref().to_string_lossy().into_owned(),
        }
    }

    /// Fallback display name: the source file name, or the whole path if it
    /// has none.
    pub fn file_name(&self) -> String {
        Path::new(&self.source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.clone())
    }

    /// Reporting name: `<parent folder>_<file name>`, the file name alone
    /// when the source has no parent folder. Results for this item carry it
    /// whether the unit of work or the supervisor produced them.
    pub fn identifier(&self) -> String {
        let source = Path::new(&self.source);
        let Some(file_name) = source.file_name() else {
            return self.source.clone();
        };
        match source.parent().and_then(Path::file_name) {
            Some(category) if !category.is_empty() => format!(
                "{}_{}",
                category.to_string_lossy(),
                file_name.to_string_lossy()
            ),
            _ => file_name.to_string_lossy().into_owned(),
        }
    }
}

/// Identity of the worker that produced a result.
///
/// Opaque to the harness: a process id for isolated workers, a synthetic id
/// for thread workers, or whatever a custom unit of work chooses to report.
/// `Unknown` is used when a failure cannot be traced back to a worker, such as
/// a timeout or a worker that never started.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
pub enum WorkerId {
    /// A worker that identified itself
    Known(u64),
    /// Failure that could not be attributed
    Unknown,
}

impl WorkerId {
    /// Identity of a worker process
    pub fn from_pid(pid: u32) -> Self {
        WorkerId::Known(pid as u64)
    }

    /// Whether this id names a real worker
    pub fn is_known(&self) -> bool {
        matches!(self, WorkerId::Known(_))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerId::Known(id) => write!(f, "{}", id),
            WorkerId::Unknown => f.write_str("unknown"),
        }
    }
}

impl FromStr for WorkerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "unknown" => Ok(WorkerId::Unknown),
            other => other
                .parse::<u64>()
                .map(WorkerId::Known)
                .map_err(|_| format!("Invalid worker id: {}", other)),
        }
    }
}

// Serialized as a string so it can key JSON maps.
impl serde::Serialize for WorkerId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for WorkerId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Outcome of one work item
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkStatus {
    /// All transforms written
    Success,
    /// The item failed; `detail` says why
    Error {
        /// Why the item failed
        detail: String,
    },
}

/// Result of processing exactly one [`WorkItem`]
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkResult {
    /// Human-readable name of the unit, for reporting
    pub identifier: String,
    /// Worker that processed (or failed) the unit
    pub worker: WorkerId,
    /// Success or failure
    pub status: WorkStatus,
}

impl WorkResult {
    /// A successful result
    pub fn success(identifier: impl Into<String>, worker: WorkerId) -> Self {
        Self {
            identifier: identifier.into(),
            worker,
            status: WorkStatus::Success,
        }
    }

    /// A failed result
    pub fn error(identifier: impl Into<String>, worker: WorkerId, detail: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            worker,
            status: WorkStatus::Error {
                detail: detail.into(),
            },
        }
    }

    /// Whether the unit succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.status, WorkStatus::Success)
    }

    /// Error detail, if the unit failed
    pub fn error_detail(&self) -> Option<&str> {
        match &self.status {
            WorkStatus::Success => None,
            WorkStatus::Error { detail } => Some(detail),
        }
    }

    /// Short status label used in logs and CSV output
    pub fn status_label(&self) -> &'static str {
        match self.status {
            WorkStatus::Success => "Success",
            WorkStatus::Error { .. } => "Error",
        }
    }
}

/// Handshake sent by a worker process as soon as its channel is open
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerHello {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// OS process id of the worker
    pub pid: u32,
}

impl WorkerHello {
    /// Hello for the calling process
    pub fn current() -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            pid: std::process::id(),
        }
    }
}

/// Messages sent from worker to supervisor
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Handshake
    Hello(WorkerHello),
    /// Reply to [`SupervisorCommand::Apply`]
    Completed(WorkResult),
    /// Reply to [`SupervisorCommand::Ping`]
    Pong,
}

/// Commands sent from supervisor to worker
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SupervisorCommand {
    /// Apply the unit of work to one item
    Apply(WorkItem),
    /// Health check
    Ping,
    /// Exit the worker loop
    Shutdown,
}
