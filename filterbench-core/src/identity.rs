//! Worker Identity
//!
//! A unit of work stamps its own worker id into every result. Inside a worker
//! process that id is the process id. Thread-backed workers share one process,
//! so each worker thread assumes a distinct synthetic id for its lifetime.

use filterbench_ipc::WorkerId;
use std::cell::Cell;

thread_local! {
    static ASSUMED: Cell<Option<WorkerId>> = const { Cell::new(None) };
}

/// Identity of the worker executing on this thread.
///
/// Falls back to the current process id when no identity was assumed.
pub fn current_worker_id() -> WorkerId {
    ASSUMED
        .with(Cell::get)
        .unwrap_or_else(|| WorkerId::from_pid(std::process::id()))
}

/// Restores the previous identity of the thread when dropped
#[must_use = "the identity is released as soon as the guard is dropped"]
pub struct IdentityGuard {
    previous: Option<WorkerId>,
}

/// Make `id` the identity reported by [`current_worker_id`] on this thread
/// until the returned guard is dropped.
pub fn assume_identity(id: WorkerId) -> IdentityGuard {
    let previous = ASSUMED.with(|cell| cell.replace(Some(id)));
    IdentityGuard { previous }
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        ASSUMED.with(|cell| cell.set(self.previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_process_id() {
        assert_eq!(current_worker_id(), WorkerId::from_pid(std::process::id()));
    }

    #[test]
    fn test_guard_nests_and_restores() {
        let outer = assume_identity(WorkerId::Known(1));
        assert_eq!(current_worker_id(), WorkerId::Known(1));
        {
            let _inner = assume_identity(WorkerId::Known(2));
            assert_eq!(current_worker_id(), WorkerId::Known(2));
        }
        assert_eq!(current_worker_id(), WorkerId::Known(1));
        drop(outer);
        assert_eq!(current_worker_id(), WorkerId::from_pid(std::process::id()));
    }

    #[test]
    fn test_identity_is_per_thread() {
        let _guard = assume_identity(WorkerId::Known(99));
        let other = std::thread::spawn(current_worker_id).join().unwrap();
        assert_eq!(other, WorkerId::from_pid(std::process::id()));
    }
}
