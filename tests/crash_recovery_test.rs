use segpool::layout::StoreLayout;
use segpool::preparer::{self, CohortProvider};
use segpool::store::{Outcome, SegmentStore};
use segpool::tokens;
use segpool::PoolError;
use std::fs;

struct FixedCohort(Vec<String>);

impl CohortProvider for FixedCohort {
    fn list_input_segments(&self) -> Result<Vec<String>, PoolError> {
        Ok(self.0.clone())
    }
}

fn cohort(names: &[&str]) -> FixedCohort {
    FixedCohort(names.iter().map(|s| s.to_string()).collect())
}

/// A worker that dies mid-batch leaves its claimed segments under
/// in_progress; the next preparation run must hand them back to the pool
/// without duplicating anything already done.
#[test]
fn test_resume_recovers_work_claimed_by_crashed_worker() {
    let temp_dir = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(temp_dir.path());
    layout.initialize().unwrap();
    let store = SegmentStore::new(layout.clone());

    // First run: three segments, the worker resolves one and crashes
    // while holding the other two.
    preparer::prepare(&store, &cohort(&["a.csv", "b.csv", "c.csv"]), false).unwrap();
    store.claim("1", 3).unwrap();
    store.take("1", 3).unwrap();
    store.release("1", "b.csv", Outcome::Done).unwrap();
    // (process dies here; a.csv and c.csv stay in the active set)

    assert_eq!(store.in_progress_depth("1"), 2);

    // Second run resumes
    let expected = preparer::prepare(&store, &cohort(&["a.csv", "b.csv", "c.csv"]), false).unwrap();

    assert_eq!(expected, vec!["a.csv", "c.csv"]);
    assert_eq!(store.list_pool(), vec!["a.csv", "c.csv"]);
    assert_eq!(store.in_progress_depth("1"), 0);
    assert_eq!(store.list_done(), vec!["b.csv"]);
}

#[test]
fn test_restart_requeues_failed_segments_and_drops_tokens() {
    let temp_dir = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(temp_dir.path());
    layout.initialize().unwrap();
    let store = SegmentStore::new(layout.clone());

    // Prior run ended with one failure, one stuck claim, one success
    preparer::prepare(&store, &cohort(&["x.csv", "y.csv", "z.csv"]), false).unwrap();
    store.claim("1", 3).unwrap();
    store.take("1", 3).unwrap();
    store.release("1", "x.csv", Outcome::Failed).unwrap();
    store.release("1", "z.csv", Outcome::Done).unwrap();
    tokens::write_worker_token(&layout, "1").unwrap();
    tokens::write_dispatcher_token(&layout, 9).unwrap();

    let expected = preparer::prepare(&store, &cohort(&["x.csv", "y.csv", "z.csv"]), true).unwrap();

    // x (failed) and y (stuck) regenerate as fresh pool entries; z stays done
    assert_eq!(expected, vec!["x.csv", "y.csv"]);
    assert!(store.list_failed().is_empty());
    assert!(layout.list_worker_ids().unwrap().is_empty());
    assert_eq!(store.list_done(), vec!["z.csv"]);
    assert!(!tokens::dispatcher_done(&layout));
    assert!(!tokens::worker_token_path(&layout, "1").exists());
}

/// Done is terminal: repeated preparation runs never move a completed
/// segment back through the pool.
#[test]
fn test_done_segments_never_reenter_pool_across_runs() {
    let temp_dir = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(temp_dir.path());
    layout.initialize().unwrap();
    let store = SegmentStore::new(layout.clone());
    fs::write(layout.done_dir().join("a.csv"), "").unwrap();

    for restart in [false, true, false] {
        let expected = preparer::prepare(&store, &cohort(&["a.csv", "b.csv"]), restart).unwrap();
        assert_eq!(expected, vec!["b.csv"]);
        assert_eq!(store.list_done(), vec!["a.csv"]);
    }
}
