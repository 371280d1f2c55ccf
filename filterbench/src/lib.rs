#![warn(missing_docs)]
//! # FilterBench
//!
//! Parallel scaling benchmark for a CPU-bound image filter workload.
//!
//! The same batch of images is processed by three strategies and every
//! parallel run is measured against a persisted serial baseline:
//! - **Serial**: one item after another on the calling thread; its duration is the baseline
//! - **Pool**: chunked static distribution over a fixed set of workers
//! - **Futures**: one future per item, workers pull from a shared queue
//!
//! Workers are separate OS processes by default (the `filterbench` binary in
//! worker mode), so a crashing or hanging item costs one counted failure
//! instead of the whole measurement.
//!
//! ## Library use
//!
//! ```ignore
//! use filterbench::prelude::*;
//! use std::sync::Arc;
//!
//! let unit: Arc<dyn UnitOfWork> = Arc::new(FilterPipeline::new());
//! let runner = PoolRunner::new(Arc::new(ThreadSpawner::new(unit, None)));
//! let results = runner.run(&batch, 4);
//! ```

pub use filterbench_cli::{
    BaselineError, BaselineStore, BenchmarkDriver, Cli, Commands, DriverError, DriverState,
    FilterConfig, FutureError, FuturePool, FutureRunner, IsolationMode, PoolRunner,
    ProcessSpawner, Runner, SerialRun, SerialRunner, SupervisorError, ThreadSpawner, Worker,
    WorkerHandle, WorkerSpawner, run, run_with_cli,
};

pub use filterbench_core::{
    FilterPipeline, Transform, UnitOfWork, apply_contained, build_batch, current_worker_id,
    discover_images,
};

pub use filterbench_ipc::{WorkItem, WorkResult, WorkStatus, WorkerId};

pub use filterbench_report::{
    BenchmarkReport, EFFICIENCY_TOLERANCE, OutputFormat, RunOutcome, ScalingRow, efficiency,
    format_summary_table, generate_json_report, speedup,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BenchmarkDriver, FilterPipeline, FutureRunner, PoolRunner, Runner, SerialRunner,
        ThreadSpawner, UnitOfWork, WorkItem, WorkResult, WorkerId,
    };
}
