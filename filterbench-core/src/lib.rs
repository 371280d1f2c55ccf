#![warn(missing_docs)]
//! FilterBench Core - Unit of Work and Worker Runtime
//!
//! This crate provides everything that runs inside a worker:
//! - `UnitOfWork` contract and the fault-containing `apply_contained` wrapper
//! - Worker identity, reported by each unit in its own result
//! - `FilterPipeline`, the five-transform image workload
//! - Input discovery for building a batch of `WorkItem`s
//! - `WorkerMain`, the loop a worker process runs when spawned by the supervisor

mod discovery;
mod filters;
mod identity;
mod unit;
mod worker;

pub use discovery::{IMAGE_EXTENSIONS, build_batch, discover_images};
pub use filters::{FilterError, FilterPipeline, Transform, UNKNOWN_NAME, unique_name};
pub use identity::{IdentityGuard, assume_identity, current_worker_id};
pub use unit::{UnitOfWork, apply_contained, panic_message};
pub use worker::{WorkerMain, shutdown_requested};

pub use filterbench_ipc::{WorkItem, WorkResult, WorkStatus, WorkerId};
