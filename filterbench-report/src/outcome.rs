//! Run Outcome
//!
//! Aggregate of one strategy run at one worker count. Built in one pass over
//! the results after the run has fully settled, so no counter is ever touched
//! by more than one thread.

use filterbench_ipc::{WorkResult, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Timing, success/failure counts and per-worker load of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Worker count the run was configured with
    pub worker_count: usize,
    /// Wall-clock duration of the whole run
    pub duration_seconds: f64,
    /// Items that succeeded
    pub success_count: usize,
    /// Items that failed, including infrastructure failures
    pub failure_count: usize,
    /// Items completed (success or failure) per worker
    pub load_distribution: BTreeMap<WorkerId, usize>,
}

impl RunOutcome {
    /// Tally `results`, attributing each to the worker it reports.
    pub fn tally(worker_count: usize, duration: Duration, results: &[WorkResult]) -> Self {
        let mut outcome = Self::empty(worker_count, duration);
        for result in results {
            outcome.record(result, result.worker);
        }
        outcome
    }

    /// Tally `results`, attributing every one to `worker`.
    ///
    /// Used by the serial runner, where everything runs on the caller.
    pub fn tally_as(
        worker_count: usize,
        duration: Duration,
        results: &[WorkResult],
        worker: WorkerId,
    ) -> Self {
        let mut outcome = Self::empty(worker_count, duration);
        for result in results {
            outcome.record(result, worker);
        }
        outcome
    }

    fn empty(worker_count: usize, duration: Duration) -> Self {
        Self {
            worker_count,
            duration_seconds: duration.as_secs_f64(),
            success_count: 0,
            failure_count: 0,
            load_distribution: BTreeMap::new(),
        }
    }

    fn record(&mut self, result: &WorkResult, worker: WorkerId) {
        if result.is_success() {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        *self.load_distribution.entry(worker).or_insert(0) += 1;
    }

    /// Items accounted for
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }

    /// Whether the counts cover exactly `batch_len` items and every item is
    /// attributed to one worker.
    pub fn accounts_for(&self, batch_len: usize) -> bool {
        self.total() == batch_len && self.load_distribution.values().sum::<usize>() == batch_len
    }

    /// Items that could not be attributed to a worker
    pub fn unattributed(&self) -> usize {
        self.load_distribution
            .get(&WorkerId::Unknown)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_results() -> Vec<WorkResult> {
        vec![
            WorkResult::success("a", WorkerId::Known(1)),
            WorkResult::success("b", WorkerId::Known(2)),
            WorkResult::error("c", WorkerId::Known(1), "bad pixels"),
            WorkResult::error("d", WorkerId::Unknown, "timed out"),
            WorkResult::success("e", WorkerId::Known(2)),
        ]
    }

    #[test]
    fn test_tally_counts_and_attribution() {
        let outcome = RunOutcome::tally(2, Duration::from_millis(1500), &mixed_results());

        assert_eq!(outcome.worker_count, 2);
        assert!((outcome.duration_seconds - 1.5).abs() < 1e-9);
        assert_eq!(outcome.success_count, 3);
        assert_eq!(outcome.failure_count, 2);
        assert_eq!(outcome.load_distribution[&WorkerId::Known(1)], 2);
        assert_eq!(outcome.load_distribution[&WorkerId::Known(2)], 2);
        assert_eq!(outcome.unattributed(), 1);
        assert!(outcome.accounts_for(5));
        assert!(!outcome.accounts_for(6));
    }

    #[test]
    fn test_tally_as_single_worker() {
        let outcome =
            RunOutcome::tally_as(1, Duration::from_secs(2), &mixed_results(), WorkerId::Known(9));
        assert_eq!(outcome.load_distribution.len(), 1);
        assert_eq!(outcome.load_distribution[&WorkerId::Known(9)], 5);
        assert!(outcome.accounts_for(5));
    }

    #[test]
    fn test_empty_batch() {
        let outcome = RunOutcome::tally(4, Duration::ZERO, &[]);
        assert_eq!(outcome.total(), 0);
        assert!(outcome.load_distribution.is_empty());
        assert!(outcome.accounts_for(0));
    }
}
