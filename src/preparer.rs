use crate::layout::list_entries;
use crate::store::{SegmentStore, move_entry};
use crate::tokens;
use crate::PoolError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Supplies the cohort of segment names the job is expected to process.
pub trait CohortProvider {
    fn list_input_segments(&self) -> Result<Vec<String>, PoolError>;
}

/// Cohort backed by a directory of segment files: every `*.csv` basename
/// is one segment.
pub struct DirCohort {
    pub cohort_dir: PathBuf,
}

impl DirCohort {
    pub fn new(cohort_dir: impl Into<PathBuf>) -> Self {
        Self {
            cohort_dir: cohort_dir.into(),
        }
    }
}

impl CohortProvider for DirCohort {
    fn list_input_segments(&self) -> Result<Vec<String>, PoolError> {
        if !self.cohort_dir.exists() {
            return Err(PoolError::Config(format!(
                "cohort dir does not exist: {}",
                self.cohort_dir.display()
            )));
        }
        let names = list_entries(&self.cohort_dir)
            .into_iter()
            .filter(|name| name.ends_with(".csv"))
            .collect();
        Ok(names)
    }
}

/// One-shot pool preparation, run before any worker starts. Returns the
/// sorted expected list the reconciler will later validate against.
pub fn prepare(
    store: &SegmentStore,
    cohort: &dyn CohortProvider,
    restart: bool,
) -> Result<Vec<String>, PoolError> {
    let layout = store.layout().clone();
    layout.initialize()?;

    if restart {
        info!("restart requested: dropping tokens and clearing failed/in_progress");
        tokens::drop_all_tokens(&layout)?;
        reset_dir(&layout.failed_dir())?;
        reset_dir(&layout.in_progress_dir())?;
    } else {
        requeue_leftovers(store)?;
    }

    populate_pool(store, cohort)?;
    dedup_against_done(store)?;

    let expected = store.list_pool();
    let body = expected.join("\n") + "\n";
    tokens::write_atomic(&layout.expected_list_path(), &body)?;
    info!(segments = expected.len(), "pool prepared");
    Ok(expected)
}

fn reset_dir(dir: &Path) -> Result<(), PoolError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(PoolError::Io)?;
    }
    fs::create_dir_all(dir).map_err(PoolError::Io)?;
    Ok(())
}

/// Move claimed-but-unresolved segments from a crashed prior run back into
/// the pool. A same-named pool entry wins; the leftover is a duplicate and
/// is discarded.
fn requeue_leftovers(store: &SegmentStore) -> Result<(), PoolError> {
    let layout = store.layout();
    let pool = layout.pool_dir();
    for worker_id in layout.list_worker_ids()? {
        let leftovers = [layout.queue_dir(&worker_id), layout.active_dir(&worker_id)];
        for dir in leftovers {
            for name in list_entries(&dir) {
                let src = dir.join(&name);
                let dst = pool.join(&name);
                if dst.exists() {
                    if let Err(e) = fs::remove_file(&src) {
                        warn!(segment = %name, error = %e, "failed to drop duplicate leftover");
                    }
                    continue;
                }
                match move_entry(&src, &dst) {
                    Ok(true) => info!(segment = %name, worker = %worker_id, "requeued leftover"),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(segment = %name, error = %e, "failed to requeue leftover, skipping");
                    }
                }
            }
        }
    }
    Ok(())
}

fn populate_pool(store: &SegmentStore, cohort: &dyn CohortProvider) -> Result<(), PoolError> {
    let pool = store.layout().pool_dir();
    for name in cohort.list_input_segments()? {
        let entry = pool.join(&name);
        if entry.exists() {
            continue;
        }
        // A pool entry is a lightweight reference; identity is the name.
        if let Err(e) = fs::write(&entry, "") {
            warn!(segment = %name, error = %e, "failed to create pool entry, skipping");
        }
    }
    Ok(())
}

/// Already-completed work is never reprocessed: any pool entry whose name
/// sits under done is removed from the pool.
fn dedup_against_done(store: &SegmentStore) -> Result<(), PoolError> {
    let done: rustc_hash::FxHashSet<String> = store.list_done().into_iter().collect();
    if done.is_empty() {
        return Ok(());
    }
    let pool = store.layout().pool_dir();
    for name in store.list_pool() {
        if done.contains(&name) {
            match fs::remove_file(pool.join(&name)) {
                Ok(()) => info!(segment = %name, "dropped pool entry already in done"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(segment = %name, error = %e, "failed to drop done duplicate"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StoreLayout;

    struct FixedCohort(Vec<String>);

    impl CohortProvider for FixedCohort {
        fn list_input_segments(&self) -> Result<Vec<String>, PoolError> {
            Ok(self.0.clone())
        }
    }

    fn cohort(names: &[&str]) -> FixedCohort {
        FixedCohort(names.iter().map(|s| s.to_string()).collect())
    }

    fn store() -> (tempfile::TempDir, SegmentStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(temp_dir.path());
        layout.initialize().unwrap();
        (temp_dir, SegmentStore::new(layout))
    }

    #[test]
    fn test_prepare_builds_pool_and_expected_list() {
        let (_tmp, store) = store();
        let expected = prepare(&store, &cohort(&["b.csv", "a.csv"]), false).unwrap();

        assert_eq!(expected, vec!["a.csv", "b.csv"]);
        assert_eq!(store.list_pool(), vec!["a.csv", "b.csv"]);

        let listed = fs::read_to_string(store.layout().expected_list_path()).unwrap();
        assert_eq!(listed, "a.csv\nb.csv\n");
    }

    #[test]
    fn test_resume_requeues_leftovers_without_duplicating_done() {
        let (_tmp, store) = store();
        let layout = store.layout().clone();

        // Crashed prior run: a and b stuck in progress, b already done
        layout.initialize_worker("1").unwrap();
        fs::write(layout.queue_dir("1").join("a.csv"), "").unwrap();
        fs::write(layout.active_dir("1").join("b.csv"), "").unwrap();
        fs::write(layout.done_dir().join("b.csv"), "").unwrap();

        let expected = prepare(&store, &cohort(&[]), false).unwrap();

        assert_eq!(expected, vec!["a.csv"]);
        assert_eq!(store.list_pool(), vec!["a.csv"]);
        assert_eq!(store.in_progress_depth("1"), 0);
        assert_eq!(store.list_done(), vec!["b.csv"]);
    }

    #[test]
    fn test_resume_discards_leftover_when_pool_has_same_name() {
        let (_tmp, store) = store();
        let layout = store.layout().clone();

        layout.initialize_worker("1").unwrap();
        fs::write(layout.pool_dir().join("a.csv"), "").unwrap();
        fs::write(layout.queue_dir("1").join("a.csv"), "").unwrap();

        let expected = prepare(&store, &cohort(&[]), false).unwrap();

        assert_eq!(expected, vec!["a.csv"]);
        assert_eq!(store.in_progress_depth("1"), 0);
    }

    #[test]
    fn test_restart_clears_failed_in_progress_and_tokens() {
        let (_tmp, store) = store();
        let layout = store.layout().clone();

        layout.initialize_worker("1").unwrap();
        fs::write(layout.failed_dir().join("x.csv"), "").unwrap();
        fs::write(layout.queue_dir("1").join("y.csv"), "").unwrap();
        fs::write(layout.done_dir().join("z.csv"), "").unwrap();
        tokens::write_worker_token(&layout, "1").unwrap();
        tokens::write_dispatcher_token(&layout, 5).unwrap();

        let expected = prepare(&store, &cohort(&["x.csv", "y.csv", "z.csv"]), true).unwrap();

        // x and y regenerate as fresh pool entries, z stays terminal
        assert_eq!(expected, vec!["x.csv", "y.csv"]);
        assert!(store.list_failed().is_empty());
        assert!(store.layout().list_worker_ids().unwrap().is_empty());
        assert_eq!(store.list_done(), vec!["z.csv"]);
        assert!(!tokens::dispatcher_done(&layout));
        assert!(!tokens::worker_token_path(&layout, "1").exists());
    }

    #[test]
    fn test_dedup_removes_already_done_cohort_entries() {
        let (_tmp, store) = store();
        fs::write(store.layout().done_dir().join("a.csv"), "").unwrap();

        let expected = prepare(&store, &cohort(&["a.csv", "b.csv"]), false).unwrap();

        assert_eq!(expected, vec!["b.csv"]);
    }

    #[test]
    fn test_dir_cohort_lists_only_csv() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("s1.csv"), "").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "").unwrap();

        let cohort = DirCohort::new(temp_dir.path());
        assert_eq!(cohort.list_input_segments().unwrap(), vec!["s1.csv"]);
    }

    #[test]
    fn test_dir_cohort_missing_dir_is_config_error() {
        let cohort = DirCohort::new("/definitely/not/here");
        assert!(cohort.list_input_segments().is_err());
    }
}
