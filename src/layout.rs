use crate::PoolError;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory layout for the shared segment store.
///
/// Every coordinating process (preparer, workers, dispatcher, reconciler)
/// is pointed at the same base directory and derives all paths from it.
#[derive(Clone)]
pub struct StoreLayout {
    pub base_dir: PathBuf,
}

impl StoreLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn pool_dir(&self) -> PathBuf {
        self.base_dir.join("pool")
    }

    pub fn in_progress_dir(&self) -> PathBuf {
        self.base_dir.join("in_progress")
    }

    /// Per-worker partition under in_progress.
    pub fn worker_dir(&self, worker_id: &str) -> PathBuf {
        self.in_progress_dir().join(format!("worker_{}", worker_id))
    }

    /// Segments claimed for a worker but not yet being processed.
    pub fn queue_dir(&self, worker_id: &str) -> PathBuf {
        self.worker_dir(worker_id).join("queue")
    }

    /// Segments the worker is actively processing.
    pub fn active_dir(&self, worker_id: &str) -> PathBuf {
        self.worker_dir(worker_id).join("active")
    }

    pub fn done_dir(&self) -> PathBuf {
        self.base_dir.join("done")
    }

    pub fn failed_dir(&self) -> PathBuf {
        self.base_dir.join("failed")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.base_dir.join("outputs")
    }

    /// Where the processing collaborator deposits per-segment artifacts.
    pub fn segment_outputs_dir(&self) -> PathBuf {
        self.outputs_dir().join("segment_outputs")
    }

    pub fn worker_logs_dir(&self) -> PathBuf {
        self.outputs_dir().join("worker_logs")
    }

    pub fn expected_list_path(&self) -> PathBuf {
        self.outputs_dir().join("expected_segments.txt")
    }

    pub fn missing_list_path(&self) -> PathBuf {
        self.outputs_dir().join("missing_segments.txt")
    }

    /// Create every directory the job needs. Failure here is fatal: no
    /// worker can run against a store that could not be created.
    pub fn initialize(&self) -> Result<(), PoolError> {
        for dir in [
            self.pool_dir(),
            self.in_progress_dir(),
            self.done_dir(),
            self.failed_dir(),
            self.outputs_dir(),
            self.segment_outputs_dir(),
            self.worker_logs_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(PoolError::Io)?;
        }
        Ok(())
    }

    /// Ensure a single worker's queue and active directories exist.
    pub fn initialize_worker(&self, worker_id: &str) -> Result<(), PoolError> {
        fs::create_dir_all(self.queue_dir(worker_id)).map_err(PoolError::Io)?;
        fs::create_dir_all(self.active_dir(worker_id)).map_err(PoolError::Io)?;
        Ok(())
    }

    /// Worker ids that have a partition under in_progress, whether or not
    /// the owning process is still alive.
    pub fn list_worker_ids(&self) -> Result<Vec<String>, PoolError> {
        let in_progress = self.in_progress_dir();
        if !in_progress.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&in_progress).map_err(PoolError::Io)? {
            let entry = entry.map_err(PoolError::Io)?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(id) = name.strip_prefix("worker_") {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// List the file basenames directly under a directory. A missing directory
/// reads as empty rather than an error: a store location that was never
/// populated and one that was drained look the same to callers.
pub fn list_entries(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return names,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                continue;
            }
            names.push(name.to_string());
        }
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_creates_all_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(temp_dir.path().join("store"));
        layout.initialize().unwrap();

        assert!(layout.pool_dir().is_dir());
        assert!(layout.in_progress_dir().is_dir());
        assert!(layout.done_dir().is_dir());
        assert!(layout.failed_dir().is_dir());
        assert!(layout.segment_outputs_dir().is_dir());
        assert!(layout.worker_logs_dir().is_dir());
    }

    #[test]
    fn test_list_worker_ids() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(temp_dir.path());
        layout.initialize().unwrap();
        layout.initialize_worker("2").unwrap();
        layout.initialize_worker("1").unwrap();

        assert_eq!(layout.list_worker_ids().unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn test_list_entries_missing_dir_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("nope");
        assert!(list_entries(&missing).is_empty());
    }

    #[test]
    fn test_list_entries_skips_hidden_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("a.csv"), "x").unwrap();
        fs::write(temp_dir.path().join(".a.csv.tmp.123"), "x").unwrap();

        assert_eq!(list_entries(temp_dir.path()), vec!["a.csv"]);
    }
}
