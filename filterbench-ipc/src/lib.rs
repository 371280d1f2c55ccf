#![warn(missing_docs)]
//! FilterBench IPC Protocol
//!
//! Types that cross the supervisor-worker isolation boundary, and the
//! length-prefixed rkyv framing used to move them over pipes.
//! Work items and results are plain values; nothing shared, nothing borrowed.

mod framing;
mod messages;

pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE, read_frame, write_frame};
pub use messages::{
    SupervisorCommand, WorkItem, WorkResult, WorkStatus, WorkerHello, WorkerId, WorkerMessage,
};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the `<read_fd>,<write_fd>` pair a worker
/// process should use instead of stdin/stdout.
pub const IPC_FD_ENV: &str = "FILTERBENCH_IPC_FD";

/// Hidden CLI flag that turns the binary into a worker process
pub const WORKER_FLAG: &str = "--filter-worker";
