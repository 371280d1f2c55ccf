//! Benchmark Driver
//!
//! Runs one strategy at a time over the configured worker counts and folds
//! the results into a report.
//!
//! ```text
//! Idle -> BaselineLoaded -> Running(w) -> Aggregated(w) -> ... -> Reported
//! ```
//!
//! Worker counts run strictly one after another in ascending order, and each
//! run's workers are torn down before the next one starts. Only missing
//! inputs (empty batch, no usable baseline) abort the driver; item failures
//! are counted.

use crate::baseline::{BaselineError, BaselineStore, validate_baseline};
use crate::runners::{Runner, SerialRun, SerialRunner};
use filterbench_ipc::WorkItem;
use filterbench_report::{BenchmarkReport, RunOutcome};
use std::time::Instant;
use thiserror::Error;

/// Configuration errors that stop the benchmark before any run
#[derive(Debug, Error)]
pub enum DriverError {
    /// The input batch is empty
    #[error("no input images found; nothing to benchmark")]
    EmptyBatch,

    /// No worker counts to run
    #[error("no worker counts configured")]
    NoWorkerCounts,

    /// A worker count of zero was requested
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    /// The baseline could not be loaded or measured
    #[error("serial baseline unavailable: {0}")]
    Baseline(#[from] BaselineError),

    /// Operation not allowed in the current state
    #[error("cannot {action} while {state}")]
    InvalidState {
        /// What was attempted
        action: &'static str,
        /// State at the time
        state: DriverState,
    },
}

/// Driver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Nothing loaded yet
    Idle,
    /// Baseline known, no run finished
    BaselineLoaded,
    /// Measuring the given worker count
    Running(usize),
    /// The given worker count has been measured and tallied
    Aggregated(usize),
    /// Report produced
    Reported,
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverState::Idle => f.write_str("idle"),
            DriverState::BaselineLoaded => f.write_str("baseline loaded"),
            DriverState::Running(w) => write!(f, "running with {} workers", w),
            DriverState::Aggregated(w) => write!(f, "aggregated {} workers", w),
            DriverState::Reported => f.write_str("reported"),
        }
    }
}

/// Sort ascending and drop duplicates; rejects empty lists and zero.
pub fn normalize_worker_counts(counts: &[usize]) -> Result<Vec<usize>, DriverError> {
    if counts.is_empty() {
        return Err(DriverError::NoWorkerCounts);
    }
    if counts.contains(&0) {
        return Err(DriverError::ZeroWorkers);
    }
    let mut counts = counts.to_vec();
    counts.sort_unstable();
    counts.dedup();
    Ok(counts)
}

/// Orchestrates the runs of one strategy
pub struct BenchmarkDriver {
    batch: Vec<WorkItem>,
    state: DriverState,
    baseline_seconds: Option<f64>,
    runs: Vec<RunOutcome>,
}

impl BenchmarkDriver {
    /// Driver over `batch`; an empty batch is a configuration error.
    pub fn new(batch: Vec<WorkItem>) -> Result<Self, DriverError> {
        if batch.is_empty() {
            return Err(DriverError::EmptyBatch);
        }
        Ok(Self {
            batch,
            state: DriverState::Idle,
            baseline_seconds: None,
            runs: Vec::new(),
        })
    }

    /// Current state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The batch every run processes
    pub fn batch(&self) -> &[WorkItem] {
        &self.batch
    }

    /// Loaded baseline, if any
    pub fn baseline_seconds(&self) -> Option<f64> {
        self.baseline_seconds
    }

    /// Outcomes measured so far, in run order
    pub fn runs(&self) -> &[RunOutcome] {
        &self.runs
    }

    fn expect_state(&self, action: &'static str, ok: bool) -> Result<(), DriverError> {
        if ok {
            Ok(())
        } else {
            Err(DriverError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    /// Idle -> BaselineLoaded, reading the baseline from `store`
    pub fn load_baseline(&mut self, store: &BaselineStore) -> Result<f64, DriverError> {
        self.expect_state("load a baseline", self.state == DriverState::Idle)?;
        let seconds = store.baseline()?;
        tracing::info!(seconds, path = %store.path().display(), "loaded serial baseline");
        self.baseline_seconds = Some(seconds);
        self.state = DriverState::BaselineLoaded;
        Ok(seconds)
    }

    /// Idle -> BaselineLoaded, measuring a serial pass over `batch`
    pub fn compute_baseline(
        &mut self,
        runner: &SerialRunner,
        batch: &[WorkItem],
    ) -> Result<SerialRun, DriverError> {
        self.expect_state("compute a baseline", self.state == DriverState::Idle)?;
        if batch.is_empty() {
            return Err(DriverError::EmptyBatch);
        }
        let run = runner.run_timed(batch);
        let seconds = validate_baseline(run.duration.as_secs_f64())?;
        tracing::info!(seconds, items = batch.len(), "measured serial baseline");
        self.baseline_seconds = Some(seconds);
        self.state = DriverState::BaselineLoaded;
        Ok(run)
    }

    /// Run `runner` once per worker count, ascending. `on_outcome` sees each
    /// outcome as soon as its run is tallied.
    pub fn run<R, F>(
        &mut self,
        runner: &R,
        worker_counts: &[usize],
        mut on_outcome: F,
    ) -> Result<&[RunOutcome], DriverError>
    where
        R: Runner + ?Sized,
        F: FnMut(&RunOutcome),
    {
        self.expect_state(
            "start runs",
            matches!(
                self.state,
                DriverState::BaselineLoaded | DriverState::Aggregated(_)
            ),
        )?;
        let counts = normalize_worker_counts(worker_counts)?;

        for workers in counts {
            self.state = DriverState::Running(workers);
            tracing::debug!(strategy = runner.name(), workers, "starting run");

            let start = Instant::now();
            let results = runner.run(&self.batch, workers);
            let duration = start.elapsed();

            let outcome = match runner.attribution() {
                Some(worker) => RunOutcome::tally_as(workers, duration, &results, worker),
                None => RunOutcome::tally(workers, duration, &results),
            };
            if !outcome.accounts_for(self.batch.len()) {
                tracing::warn!(
                    expected = self.batch.len(),
                    got = outcome.total(),
                    "run returned the wrong number of results"
                );
            }

            on_outcome(&outcome);
            self.runs.push(outcome);
            self.state = DriverState::Aggregated(workers);
        }

        Ok(&self.runs)
    }

    /// Aggregated -> Reported
    pub fn report(&mut self, strategy: &str) -> Result<BenchmarkReport, DriverError> {
        self.expect_state("report", matches!(self.state, DriverState::Aggregated(_)))?;
        let baseline = self.baseline_seconds.ok_or(DriverError::InvalidState {
            action: "report",
            state: self.state,
        })?;

        self.state = DriverState::Reported;
        Ok(BenchmarkReport::new(
            strategy,
            self.batch.len(),
            baseline,
            std::mem::take(&mut self.runs),
        ))
    }
}
