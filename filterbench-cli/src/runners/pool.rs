//! Pool Runner
//!
//! Static sharding: the batch is cut into contiguous chunks which are dealt
//! round-robin to exactly `workers` shards. Each shard is served by one worker
//! on its own rayon thread, and the results are put back into submission
//! order once every shard has finished.
//!
//! A worker that dies mid-shard costs only the item it was holding; the shard
//! respawns a worker for the rest of its items.

use super::Runner;
use crate::supervisor::{SupervisorError, Worker, WorkerSpawner, infrastructure_failure};
use filterbench_ipc::{WorkItem, WorkResult, WorkerId};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::sync::Arc;

/// Chunk size for `len` items over `workers` workers: `len / (workers * factor)`,
/// rounded up, and at least 1.
pub fn chunk_size(len: usize, workers: usize, chunks_per_worker: usize) -> usize {
    let slots = workers.max(1) * chunks_per_worker.max(1);
    let (quotient, remainder) = (len / slots, len % slots);
    (quotient + usize::from(remainder > 0)).max(1)
}

/// Cut `batch` into chunks of `chunk_size` and deal them round-robin to
/// `workers` shards. Items keep their batch index.
pub fn shard_chunks(
    batch: &[WorkItem],
    workers: usize,
    chunk_size: usize,
) -> Vec<Vec<(usize, &WorkItem)>> {
    let workers = workers.max(1);
    let mut shards: Vec<Vec<(usize, &WorkItem)>> = vec![Vec::new(); workers];
    let indexed: Vec<(usize, &WorkItem)> = batch.iter().enumerate().collect();
    for (position, chunk) in indexed.chunks(chunk_size.max(1)).enumerate() {
        shards[position % workers].extend_from_slice(chunk);
    }
    shards
}

/// Fixed-size pool with chunked static distribution
pub struct PoolRunner {
    spawner: Arc<dyn WorkerSpawner>,
    chunks_per_worker: usize,
}

impl PoolRunner {
    /// Pool runner drawing workers from `spawner`
    pub fn new(spawner: Arc<dyn WorkerSpawner>) -> Self {
        Self {
            spawner,
            chunks_per_worker: 4,
        }
    }

    /// Override the chunks-per-worker factor used to size chunks
    pub fn with_chunks_per_worker(mut self, factor: usize) -> Self {
        self.chunks_per_worker = factor.max(1);
        self
    }

    fn spawn_failure(item: &WorkItem, error: &SupervisorError) -> WorkResult {
        infrastructure_failure(item, WorkerId::Unknown, error)
    }

    /// Serve one shard with a single (respawned as needed) worker
    fn run_shard(&self, shard: &[(usize, &WorkItem)]) -> Vec<(usize, WorkResult)> {
        let mut results = Vec::with_capacity(shard.len());
        if shard.is_empty() {
            return results;
        }

        let mut worker: Option<Box<dyn Worker>> = match self.spawner.spawn() {
            Ok(worker) => Some(worker),
            Err(e) => {
                tracing::warn!(error = %e, items = shard.len(), "failed to start pool worker");
                for &(index, item) in shard {
                    results.push((index, Self::spawn_failure(item, &e)));
                }
                return results;
            }
        };

        for &(index, item) in shard {
            if worker.is_none() {
                match self.spawner.spawn() {
                    Ok(fresh) => worker = Some(fresh),
                    Err(e) => {
                        results.push((index, Self::spawn_failure(item, &e)));
                        continue;
                    }
                }
            }
            let Some(active) = worker.as_mut() else {
                continue;
            };

            match active.apply(item) {
                Ok(result) => results.push((index, result)),
                Err(e) => {
                    let id = active.id();
                    tracing::warn!(worker = %id, item = %item.identifier(), error = %e, "pool worker failed");
                    results.push((index, infrastructure_failure(item, id, &e)));
                    if !active.is_alive() {
                        // Replaced before the next item.
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
        results
    }
}

impl Runner for PoolRunner {
    fn name(&self) -> &'static str {
        "pool"
    }

    fn run(&self, batch: &[WorkItem], workers: usize) -> Vec<WorkResult> {
        if batch.is_empty() {
            return Vec::new();
        }
        let workers = workers.max(1);
        let size = chunk_size(batch.len(), workers, self.chunks_per_worker);
        let shards = shard_chunks(batch, workers, size);
        tracing::debug!(workers, chunk_size = size, items = batch.len(), "pool distribution");

        let pool = match ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(error = %e, "failed to build pool threads");
                return batch
                    .iter()
                    .map(|item| {
                        WorkResult::error(
                            item.identifier(),
                            WorkerId::Unknown,
                            format!("Failed to build worker pool: {}", e),
                        )
                    })
                    .collect();
            }
        };

        let shard_results: Vec<Vec<(usize, WorkResult)>> = pool.install(|| {
            shards
                .par_iter()
                .map(|shard| self.run_shard(shard))
                .collect()
        });
        self.spawner.reap();

        let mut indexed: Vec<(usize, WorkResult)> = shard_results.into_iter().flatten().collect();
        indexed.sort_by_key(|(index, _)| *index);
        debug_assert_eq!(indexed.len(), batch.len());

        indexed.into_iter().map(|(_, result)| result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::ThreadSpawner;
    use filterbench_core::{UnitOfWork, current_worker_id};
    use std::collections::HashSet;
    use std::time::Duration;

    fn batch(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem::new(format!("in/{}.png", i), "out"))
            .collect()
    }

    fn runner(unit: Arc<dyn UnitOfWork>, timeout: Option<Duration>) -> PoolRunner {
        PoolRunner::new(Arc::new(ThreadSpawner::new(unit, timeout)))
    }

    #[test]
    fn test_chunk_size_matches_starmap() {
        assert_eq!(chunk_size(100, 4, 4), 7);
        assert_eq!(chunk_size(16, 4, 4), 1);
        assert_eq!(chunk_size(10, 2, 4), 2);
        assert_eq!(chunk_size(3, 8, 4), 1);
        assert_eq!(chunk_size(0, 2, 4), 1);
    }

    #[test]
    fn test_shards_are_round_robin_chunks() {
        let items = batch(10);
        let shards = shard_chunks(&items, 2, 2);
        let indices: Vec<Vec<usize>> = shards
            .iter()
            .map(|shard| shard.iter().map(|(i, _)| *i).collect())
            .collect();
        assert_eq!(indices, vec![vec![0, 1, 4, 5, 8, 9], vec![2, 3, 6, 7]]);

        let few = shard_chunks(&items[..3], 8, 1);
        assert_eq!(few.len(), 8);
        assert_eq!(few.iter().filter(|s| !s.is_empty()).count(), 3);
    }

    #[test]
    fn test_pool_returns_every_item_in_order() {
        let unit: Arc<dyn UnitOfWork> =
            Arc::new(|item: &WorkItem| WorkResult::success(item.file_name(), current_worker_id()));
        let items = batch(23);
        let results = runner(unit, None).run(&items, 4);

        assert_eq!(results.len(), 23);
        for (item, result) in items.iter().zip(&results) {
            assert_eq!(item.file_name(), result.identifier);
        }
        let workers: HashSet<_> = results.iter().map(|r| r.worker).collect();
        assert!(workers.len() <= 4);
        assert!(!workers.contains(&current_worker_id()));
    }

    #[test]
    fn test_pool_timeout_counts_unknown_and_continues() {
        let unit: Arc<dyn UnitOfWork> = Arc::new(|item: &WorkItem| {
            if item.file_name() == "0.png" {
                std::thread::sleep(Duration::from_millis(400));
            }
            WorkResult::success(item.file_name(), current_worker_id())
        });
        let items = batch(4);
        let results = runner(unit, Some(Duration::from_millis(100))).run(&items, 1);

        assert_eq!(results.len(), 4);
        assert!(!results[0].is_success());
        assert_eq!(results[0].worker, WorkerId::Unknown);
        assert_eq!(results[0].identifier, items[0].identifier());
        assert!(results[1..].iter().all(WorkResult::is_success));
    }
}
