//! Strategy Runners
//!
//! Each runner takes the whole batch and a worker count and returns exactly
//! one result per item. Runners never fail as a whole: every fault below
//! them becomes an Error result.

mod futures;
mod pool;
mod serial;

pub use futures::{FutureError, FuturePool, FutureRunner, Settled, WorkFuture};
pub use pool::{PoolRunner, chunk_size, shard_chunks};
pub use serial::{SerialRun, SerialRunner};

use filterbench_ipc::{WorkItem, WorkResult, WorkerId};

/// A concurrency strategy under benchmark
pub trait Runner {
    /// Strategy name used in reports
    fn name(&self) -> &'static str;

    /// Apply the unit of work to every item using `workers` workers.
    ///
    /// Returns one result per item; order is strategy-specific.
    fn run(&self, batch: &[WorkItem], workers: usize) -> Vec<WorkResult>;

    /// Worker every result should be charged to, when the strategy runs
    /// everything on one known context.
    fn attribution(&self) -> Option<WorkerId> {
        None
    }
}
