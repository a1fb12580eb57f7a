use crate::layout::{StoreLayout, list_entries};
use crate::PoolError;
use rustc_hash::FxHashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

/// Location of a segment reference. The four sets are disjoint by
/// construction: a reference is a single file that lives in exactly one
/// directory at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Pool,
    InProgress,
    Done,
    Failed,
}

/// Terminal outcome reported by a worker for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Failed,
}

/// Result of a release call. `AlreadyReleased` means a prior attempt
/// (possibly from a crashed process) completed the move first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Moved,
    AlreadyReleased,
}

/// Shared segment store. All coordination between the preparer, workers
/// and dispatcher goes through the directories described by `layout`;
/// the only mutual-exclusion primitive is the atomic rename in `claim`.
pub struct SegmentStore {
    layout: StoreLayout,
}

impl SegmentStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Claim up to `max_count` segments from the pool into the worker's
    /// queue. Best-effort: a pool entry that vanishes mid-claim was won by
    /// a racing claimer and is skipped. An empty result is the normal
    /// "work may be finished" signal, never an error.
    pub fn claim(&self, worker_id: &str, max_count: usize) -> Result<Vec<String>, PoolError> {
        self.layout.initialize_worker(worker_id)?;
        let pool = self.layout.pool_dir();
        let queue = self.layout.queue_dir(worker_id);

        let mut claimed = Vec::new();
        for name in list_entries(&pool) {
            if claimed.len() >= max_count {
                break;
            }
            let src = pool.join(&name);
            let dst = queue.join(&name);
            match move_entry(&src, &dst) {
                Ok(true) => claimed.push(name),
                Ok(false) => {} // lost the race, next candidate
                Err(e) => {
                    warn!(segment = %name, error = %e, "claim move failed, skipping");
                }
            }
        }
        Ok(claimed)
    }

    /// Move up to `max_count` segments from the worker's queue into its
    /// active set. Both directories belong to the worker, so there is no
    /// contention; a missing entry still just skips.
    pub fn take(&self, worker_id: &str, max_count: usize) -> Result<Vec<String>, PoolError> {
        self.layout.initialize_worker(worker_id)?;
        let queue = self.layout.queue_dir(worker_id);
        let active = self.layout.active_dir(worker_id);

        let mut taken = Vec::new();
        for name in list_entries(&queue) {
            if taken.len() >= max_count {
                break;
            }
            let src = queue.join(&name);
            let dst = active.join(&name);
            match move_entry(&src, &dst) {
                Ok(true) => taken.push(name),
                Ok(false) => {}
                Err(e) => {
                    warn!(segment = %name, error = %e, "take move failed, skipping");
                }
            }
        }
        Ok(taken)
    }

    /// Deposit a segment from the worker's active set into done or failed.
    /// Idempotent: if the source is gone but the destination exists, a
    /// prior attempt already completed the move and this is a no-op.
    pub fn release(
        &self,
        worker_id: &str,
        segment: &str,
        outcome: Outcome,
    ) -> Result<Release, PoolError> {
        let src = self.layout.active_dir(worker_id).join(segment);
        let dest_dir = match outcome {
            Outcome::Done => self.layout.done_dir(),
            Outcome::Failed => self.layout.failed_dir(),
        };
        fs::create_dir_all(&dest_dir).map_err(PoolError::Io)?;
        let dst = dest_dir.join(segment);

        if !src.exists() {
            if dst.exists() {
                return Ok(Release::AlreadyReleased);
            }
            return Err(PoolError::Store(format!(
                "segment {} not in active set of worker {}",
                segment, worker_id
            )));
        }
        match move_entry(&src, &dst) {
            Ok(_) => Ok(Release::Moved),
            Err(e) => Err(e),
        }
    }

    pub fn pool_count(&self) -> usize {
        list_entries(&self.layout.pool_dir()).len()
    }

    pub fn queue_depth(&self, worker_id: &str) -> usize {
        list_entries(&self.layout.queue_dir(worker_id)).len()
    }

    /// Queue plus active count for one worker.
    pub fn in_progress_depth(&self, worker_id: &str) -> usize {
        self.queue_depth(worker_id) + list_entries(&self.layout.active_dir(worker_id)).len()
    }

    pub fn list_pool(&self) -> Vec<String> {
        list_entries(&self.layout.pool_dir())
    }

    pub fn list_done(&self) -> Vec<String> {
        list_entries(&self.layout.done_dir())
    }

    pub fn list_failed(&self) -> Vec<String> {
        list_entries(&self.layout.failed_dir())
    }

    /// One consistent-enough scan of the whole store. Built once and
    /// queried as a map instead of re-walking directories per lookup.
    pub fn snapshot(&self) -> Result<FxHashMap<String, SegmentState>, PoolError> {
        let mut index = FxHashMap::default();
        for name in self.list_pool() {
            index.insert(name, SegmentState::Pool);
        }
        for worker_id in self.layout.list_worker_ids()? {
            for name in list_entries(&self.layout.queue_dir(&worker_id)) {
                index.insert(name, SegmentState::InProgress);
            }
            for name in list_entries(&self.layout.active_dir(&worker_id)) {
                index.insert(name, SegmentState::InProgress);
            }
        }
        for name in self.list_done() {
            index.insert(name, SegmentState::Done);
        }
        for name in self.list_failed() {
            index.insert(name, SegmentState::Failed);
        }
        Ok(index)
    }
}

/// Move a file with an atomic rename. Returns Ok(false) if the source no
/// longer exists (another process won the race). On a cross-device rename
/// failure, falls back to copy into a hidden temp name in the destination
/// directory followed by an atomic rename into place.
pub fn move_entry(src: &Path, dst: &Path) -> Result<bool, PoolError> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => copy_then_replace(src, dst),
        Err(e) => Err(PoolError::Io(e)),
    }
}

fn copy_then_replace(src: &Path, dst: &Path) -> Result<bool, PoolError> {
    let dst_dir = dst.parent().unwrap_or_else(|| Path::new("."));
    let file_name = dst
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("segment");
    let tmp = dst_dir.join(format!(".{}.tmp.{}", file_name, std::process::id()));

    if let Err(e) = fs::copy(src, &tmp) {
        let _ = fs::remove_file(&tmp);
        if e.kind() == ErrorKind::NotFound {
            return Ok(false);
        }
        return Err(PoolError::Io(e));
    }
    fs::rename(&tmp, dst).map_err(PoolError::Io)?;
    if let Err(e) = fs::remove_file(src) {
        if e.kind() != ErrorKind::NotFound {
            warn!(src = %src.display(), error = %e, "failed to remove source after copy");
        }
    }
    Ok(true)
}
