//! Future Runner
//!
//! Every item is submitted on its own and gets a [`WorkFuture`]. A fixed set
//! of dispatcher threads, each owning one worker, pull submissions off a
//! shared queue, so an idle worker always takes the next item. Outcomes are
//! collected in completion order.
//!
//! Each submission carries a promise that settles exactly once. A promise
//! dropped without being settled (a dispatcher died, or the queue was torn
//! down) settles as [`FutureError::Abandoned`], so collection never waits on
//! an item nobody is working on.

use super::Runner;
use crate::supervisor::{SupervisorError, Worker, WorkerSpawner};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use filterbench_ipc::{WorkItem, WorkResult, WorkerId};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

const COLLECT_POLL: Duration = Duration::from_millis(100);

/// Fault that kept a future from producing the item's own result
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FutureError {
    /// The worker crashed or broke the protocol while holding the item
    #[error("worker {worker} failed: {message}")]
    WorkerFault {
        /// Worker that held the item
        worker: WorkerId,
        /// What went wrong
        message: String,
    },

    /// The item exceeded the per-item timeout
    #[error("worker timed out")]
    TimedOut,

    /// No worker could be started for the item
    #[error("could not start worker: {0}")]
    SpawnFailed(String),

    /// The promise was dropped without being settled
    #[error("future abandoned before it settled")]
    Abandoned,
}

impl FutureError {
    fn from_supervisor(error: &SupervisorError, worker: WorkerId) -> Self {
        match error {
            SupervisorError::Timeout => FutureError::TimedOut,
            SupervisorError::SpawnFailed(e) => FutureError::SpawnFailed(e.to_string()),
            other => FutureError::WorkerFault {
                worker,
                message: other.to_string(),
            },
        }
    }

    /// Worker the failure is charged to
    pub fn worker(&self) -> WorkerId {
        match self {
            FutureError::WorkerFault { worker, .. } => *worker,
            _ => WorkerId::Unknown,
        }
    }

    /// Error result for `item`
    pub fn into_result(self, item: &WorkItem) -> WorkResult {
        WorkResult::error(item.identifier(), self.worker(), self.to_string())
    }
}

/// Handle to one submitted item
#[derive(Debug, Clone)]
pub struct WorkFuture {
    slot: usize,
    item: WorkItem,
}

impl WorkFuture {
    /// Submission index
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The submitted item
    pub fn item(&self) -> &WorkItem {
        &self.item
    }
}

/// A future together with its outcome
#[derive(Debug, Clone)]
pub struct Settled {
    /// The future that settled
    pub future: WorkFuture,
    /// Its outcome
    pub outcome: Result<WorkResult, FutureError>,
}

impl Settled {
    /// The item's result, converting a future-level fault into an Error result
    pub fn into_result(self) -> WorkResult {
        match self.outcome {
            Ok(result) => result,
            Err(e) => e.into_result(&self.future.item),
        }
    }
}

type Completion = (usize, Result<WorkResult, FutureError>);

/// Write side of a future; settles as `Abandoned` when dropped unsettled.
struct Promise {
    slot: usize,
    done_tx: Option<Sender<Completion>>,
}

impl Promise {
    fn settle(mut self, outcome: Result<WorkResult, FutureError>) {
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.send((self.slot, outcome));
        }
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.send((self.slot, Err(FutureError::Abandoned)));
        }
    }
}

struct Job {
    item: WorkItem,
    promise: Promise,
}

/// Executor with a fixed number of workers and independent submissions
pub struct FuturePool {
    job_tx: Option<Sender<Job>>,
    /// Kept to drain submissions no dispatcher will ever take.
    job_rx: Receiver<Job>,
    done_tx: Option<Sender<Completion>>,
    done_rx: Receiver<Completion>,
    dispatchers: Vec<JoinHandle<()>>,
    submitted: Vec<WorkFuture>,
}

impl FuturePool {
    /// Start `workers` dispatchers, each with its own worker from `spawner`
    pub fn new(spawner: Arc<dyn WorkerSpawner>, workers: usize) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Completion>();

        let mut dispatchers = Vec::with_capacity(workers.max(1));
        for n in 0..workers.max(1) {
            let rx = job_rx.clone();
            let spawner = spawner.clone();
            let handle = std::thread::Builder::new()
                .name(format!("filterbench-dispatch-{}", n))
                .spawn(move || dispatch(spawner.as_ref(), rx));
            match handle {
                Ok(handle) => dispatchers.push(handle),
                Err(e) => tracing::warn!(error = %e, "failed to start dispatcher thread"),
            }
        }

        Self {
            job_tx: Some(job_tx),
            job_rx,
            done_tx: Some(done_tx),
            done_rx,
            dispatchers,
            submitted: Vec::new(),
        }
    }

    /// Submit one item; returns its future
    pub fn submit(&mut self, item: WorkItem) -> WorkFuture {
        let future = WorkFuture {
            slot: self.submitted.len(),
            item: item.clone(),
        };
        let promise = Promise {
            slot: future.slot,
            done_tx: self.done_tx.clone(),
        };
        if let Some(tx) = &self.job_tx {
            // On a closed queue the job is dropped and its promise abandons.
            let _ = tx.send(Job { item, promise });
        }
        self.submitted.push(future.clone());
        future
    }

    /// Close submissions and wait for every future to settle, returning them
    /// in completion order. Dispatchers and their workers are torn down
    /// before this returns.
    pub fn wait_all(mut self) -> Vec<Settled> {
        self.job_tx = None;
        self.done_tx = None;

        let mut slots: Vec<Option<WorkFuture>> =
            std::mem::take(&mut self.submitted).into_iter().map(Some).collect();
        let mut settled = Vec::with_capacity(slots.len());

        while settled.len() < slots.len() {
            match self.done_rx.recv_timeout(COLLECT_POLL) {
                Ok((slot, outcome)) => {
                    if let Some(future) = slots.get_mut(slot).and_then(Option::take) {
                        settled.push(Settled { future, outcome });
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.dispatchers.iter().all(JoinHandle::is_finished) {
                        // Nobody is left to take these; their promises abandon.
                        while let Ok(job) = self.job_rx.try_recv() {
                            drop(job);
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Anything still unaccounted for never got a completion.
        for future in slots.into_iter().flatten() {
            settled.push(Settled {
                future,
                outcome: Err(FutureError::Abandoned),
            });
        }

        self.join_dispatchers();
        settled
    }

    fn join_dispatchers(&mut self) {
        self.job_tx = None;
        for handle in self.dispatchers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("dispatcher thread panicked");
            }
        }
    }
}

impl Drop for FuturePool {
    fn drop(&mut self) {
        self.job_tx = None;
        while let Ok(job) = self.job_rx.try_recv() {
            drop(job);
        }
        self.join_dispatchers();
    }
}

/// Dispatcher loop: one worker, items pulled from the shared queue
fn dispatch(spawner: &dyn WorkerSpawner, jobs: Receiver<Job>) {
    let mut worker: Option<Box<dyn Worker>> = None;

    for Job { item, promise } in jobs {
        if worker.is_none() {
            match spawner.spawn() {
                Ok(fresh) => worker = Some(fresh),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to start futures worker");
                    promise.settle(Err(FutureError::from_supervisor(&e, WorkerId::Unknown)));
                    continue;
                }
            }
        }
        let Some(active) = worker.as_mut() else {
            continue;
        };

        match active.apply(&item) {
            Ok(result) => promise.settle(Ok(result)),
            Err(e) => {
                let id = active.id();
                tracing::warn!(worker = %id, item = %item.identifier(), error = %e, "futures worker failed");
                promise.settle(Err(FutureError::from_supervisor(&e, id)));
                if !active.is_alive() {
                    if let Some(dead) = worker.take() {
                        dead.shutdown();
                    }
                }
            }
        }
    }

    if let Some(worker) = worker {
        worker.shutdown();
    }
}

/// Submit-then-wait strategy over a [`FuturePool`]
pub struct FutureRunner {
    spawner: Arc<dyn WorkerSpawner>,
}

impl FutureRunner {
    /// Future runner drawing workers from `spawner`
    pub fn new(spawner: Arc<dyn WorkerSpawner>) -> Self {
        Self { spawner }
    }
}

impl Runner for FutureRunner {
    fn name(&self) -> &'static str {
        "futures"
    }

    fn run(&self, batch: &[WorkItem], workers: usize) -> Vec<WorkResult> {
        if batch.is_empty() {
            return Vec::new();
        }

        let mut pool = FuturePool::new(self.spawner.clone(), workers);
        for item in batch {
            pool.submit(item.clone());
        }

        let settled = pool.wait_all();
        self.spawner.reap();
        settled.into_iter().map(Settled::into_result).collect()
    }
}
