//! Unit-of-Work Contract
//!
//! `apply(item) -> WorkResult` is all a runner knows about the workload. An
//! implementation must depend only on its input, report its own worker id, and
//! turn its own failures into an Error result. `apply_contained` backs that up
//! by catching panics, so a misbehaving unit still yields exactly one result.

use crate::identity::current_worker_id;
use filterbench_ipc::{WorkItem, WorkResult};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// The workload applied to every item in a batch
pub trait UnitOfWork: Send + Sync {
    /// Process one item. Never fails: errors are returned as
    /// [`WorkResult::error`].
    fn apply(&self, item: &WorkItem) -> WorkResult;
}

impl<F> UnitOfWork for F
where
    F: Fn(&WorkItem) -> WorkResult + Send + Sync,
{
    fn apply(&self, item: &WorkItem) -> WorkResult {
        self(item)
    }
}

/// Run `unit` on `item`, converting a panic into an Error result attributed to
/// the current worker.
pub fn apply_contained(unit: &dyn UnitOfWork, item: &WorkItem) -> WorkResult {
    match catch_unwind(AssertUnwindSafe(|| unit.apply(item))) {
        Ok(result) => result,
        Err(panic) => WorkResult::error(
            item.identifier(),
            current_worker_id(),
            format!("unit of work panicked: {}", panic_message(panic.as_ref())),
        ),
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
