//! Serial Runner
//!
//! Applies the unit of work to every item, in input order, on the calling
//! thread. Its duration is the baseline every parallel run is measured
//! against.

use super::Runner;
use filterbench_core::{UnitOfWork, apply_contained, current_worker_id};
use filterbench_ipc::{WorkItem, WorkResult, WorkerId};
use filterbench_report::{DetailRow, TimingSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Results and timings of one serial pass
#[derive(Debug, Clone)]
pub struct SerialRun {
    /// One result per item, in input order
    pub results: Vec<WorkResult>,
    /// Seconds spent on each item, aligned with `results`
    pub item_seconds: Vec<f64>,
    /// Wall-clock duration of the whole pass
    pub duration: Duration,
    /// Context every item ran on
    pub worker: WorkerId,
}

impl SerialRun {
    /// Detail-log rows in insertion order
    pub fn detail_rows(&self) -> Vec<DetailRow> {
        self.results
            .iter()
            .zip(&self.item_seconds)
            .map(|(result, &seconds)| DetailRow {
                filename: result.identifier.clone(),
                duration_seconds: seconds,
                status: result.status_label().to_string(),
                worker: self.worker,
            })
            .collect()
    }

    /// Summary of the per-item timings
    pub fn timing_summary(&self) -> Option<TimingSummary> {
        TimingSummary::from_durations(&self.item_seconds)
    }
}

/// Runs the whole batch on the caller
pub struct SerialRunner {
    unit: Arc<dyn UnitOfWork>,
    show_progress: bool,
}

impl SerialRunner {
    /// Serial runner applying `unit`
    pub fn new(unit: Arc<dyn UnitOfWork>) -> Self {
        Self {
            unit,
            show_progress: false,
        }
    }

    /// Show a progress bar while running
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }

    /// Run the batch, timing the whole pass and every item
    pub fn run_timed(&self, batch: &[WorkItem]) -> SerialRun {
        let worker = current_worker_id();
        let pb = self.progress_bar(batch.len());

        let mut results = Vec::with_capacity(batch.len());
        let mut item_seconds = Vec::with_capacity(batch.len());

        let start = Instant::now();
        for item in batch {
            pb.set_message(item.file_name());
            let item_start = Instant::now();
            let result = apply_contained(self.unit.as_ref(), item);
            let seconds = item_start.elapsed().as_secs_f64();

            tracing::debug!(
                item = %result.identifier,
                status = result.status_label(),
                seconds,
                "serial item done"
            );
            results.push(result);
            item_seconds.push(seconds);
            pb.inc(1);
        }
        let duration = start.elapsed();
        pb.finish_and_clear();

        SerialRun {
            results,
            item_seconds,
            duration,
            worker,
        }
    }
}

impl Runner for SerialRunner {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn run(&self, batch: &[WorkItem], _workers: usize) -> Vec<WorkResult> {
        self.run_timed(batch).results
    }

    fn attribution(&self) -> Option<WorkerId> {
        Some(current_worker_id())
    }
}
