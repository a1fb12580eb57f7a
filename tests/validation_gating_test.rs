use rustc_hash::FxHashSet;
use segpool::layout::StoreLayout;
use segpool::reconciler::{self, CleanupAction};
use segpool::store::Outcome;
use segpool::tokens;
use std::fs;

fn set(names: &[&str]) -> FxHashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn expected(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_failed_validation_blocks_cleanup_until_outputs_complete() {
    let temp_dir = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(temp_dir.path().join("store"));
    layout.initialize().unwrap();
    let final_dir = temp_dir.path().join("final");
    fs::write(layout.segment_outputs_dir().join("s1.csv"), "x").unwrap();

    // First pass: s2 never produced output
    let result =
        reconciler::run_validation(&layout, &expected(&["s1.csv", "s2.csv"]), &set(&["s1.csv"]))
            .unwrap();
    assert_eq!(result.outcome, Outcome::Failed);
    assert_eq!(result.missing, vec!["s2.csv"]);

    // Operator can read exactly what is missing
    let missing = fs::read_to_string(layout.missing_list_path()).unwrap();
    assert_eq!(missing, "s2.csv\n");

    // Cleanup refuses and leaves a skip marker; no copy, no delete
    let action = reconciler::cleanup(&layout, &final_dir, false).unwrap();
    assert_eq!(action, CleanupAction::Skipped);
    assert!(!final_dir.exists());
    assert!(layout.pool_dir().exists());
    assert!(tokens::cleanup_failed_token_path(&layout).exists());

    // Second pass after the missing segment was reprocessed
    let result = reconciler::run_validation(
        &layout,
        &expected(&["s1.csv", "s2.csv"]),
        &set(&["s1.csv", "s2.csv"]),
    )
    .unwrap();
    assert_eq!(result.outcome, Outcome::Done);

    let action = reconciler::cleanup(&layout, &final_dir, false).unwrap();
    assert_eq!(action, CleanupAction::Removed);
    assert!(final_dir.join("segment_outputs").join("s1.csv").exists());
    assert!(!layout.pool_dir().exists());
}

#[test]
fn test_missing_validation_token_also_blocks_cleanup() {
    let temp_dir = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(temp_dir.path().join("store"));
    layout.initialize().unwrap();
    let final_dir = temp_dir.path().join("final");

    // Cleanup before any validation ran
    let action = reconciler::cleanup(&layout, &final_dir, false).unwrap();
    assert_eq!(action, CleanupAction::Skipped);
    assert!(!final_dir.exists());
}
