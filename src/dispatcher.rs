use crate::store::SegmentStore;
use crate::tokens;
use crate::PoolError;
use rustc_hash::FxHashMap;
use std::time::Duration;
use tracing::{info, warn};

/// What the dispatcher saw on one polling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub pool_size: usize,
    /// worker id -> queue + active depth
    pub depths: FxHashMap<String, usize>,
}

impl Observation {
    pub fn capture(store: &SegmentStore, worker_ids: &[String]) -> Observation {
        let mut depths = FxHashMap::default();
        for id in worker_ids {
            depths.insert(id.clone(), store.in_progress_depth(id));
        }
        Observation {
            pool_size: store.pool_count(),
            depths,
        }
    }
}

/// Advance the idle-cycle counter given two consecutive observations.
/// Counts idle only when the pool is empty and no worker's in-progress
/// depth moved; a worker appearing or disappearing counts as movement.
pub fn next_idle_cycles(prev: &Observation, curr: &Observation, idle: u32) -> u32 {
    if curr.pool_size != 0 {
        return 0;
    }
    if prev.depths.len() != curr.depths.len() {
        return 0;
    }
    for (worker, depth) in &curr.depths {
        if prev.depths.get(worker) != Some(depth) {
            return 0;
        }
    }
    idle + 1
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of workers; ids are "1"..=workers.
    pub workers: usize,
    pub segments_per_claim: usize,
    pub poll_interval: Duration,
    pub max_idle_cycles: u32,
}

/// Long-lived coordinator. Tops up empty worker queues from the pool and
/// terminates after `max_idle_cycles` consecutive cycles without observed
/// progress, leaving `dispatcher.done` behind.
pub struct Dispatcher {
    store: SegmentStore,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(store: SegmentStore, config: DispatcherConfig) -> Self {
        Self { store, config }
    }

    pub fn worker_ids(&self) -> Vec<String> {
        (1..=self.config.workers).map(|i| i.to_string()).collect()
    }

    /// Replenish each worker whose queue ran dry. Polling I/O errors are
    /// logged and retried next cycle; terminating here would strand
    /// workers mid-batch.
    fn top_up(&self, worker_ids: &[String]) {
        for worker_id in worker_ids {
            if self.store.queue_depth(worker_id) > 0 {
                continue;
            }
            match self.store.claim(worker_id, self.config.segments_per_claim) {
                Ok(claimed) if !claimed.is_empty() => {
                    info!(worker = %worker_id, count = claimed.len(), "queue topped up");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(worker = %worker_id, error = %e, "top-up failed, will retry next cycle");
                }
            }
        }
    }

    /// Run until the idle threshold fires, then write the completion
    /// token. Returns the total number of cycles run.
    pub fn run(&self) -> Result<u64, PoolError> {
        let worker_ids = self.worker_ids();
        for worker_id in &worker_ids {
            if let Err(e) = self.store.layout().initialize_worker(worker_id) {
                warn!(worker = %worker_id, error = %e, "failed to create worker dirs");
            }
        }

        let mut prev = Observation::capture(&self.store, &worker_ids);
        let mut idle: u32 = 0;
        let mut cycles: u64 = 0;

        loop {
            cycles += 1;
            self.top_up(&worker_ids);

            let curr = Observation::capture(&self.store, &worker_ids);
            idle = next_idle_cycles(&prev, &curr, idle);
            prev = curr;

            if idle >= self.config.max_idle_cycles {
                info!(cycles, idle, "no activity for idle threshold, dispatcher exiting");
                tokens::write_dispatcher_token(self.store.layout(), cycles)?;
                return Ok(cycles);
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}
