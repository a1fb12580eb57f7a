use crate::layout::{StoreLayout, list_entries};
use crate::store::Outcome;
use crate::tokens;
use crate::PoolError;
use itertools::Itertools;
use rustc_hash::FxHashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Merge collaborator: consumes the output artifacts and reports which
/// segments actually produced output.
pub trait Merger {
    fn merge(&self, outputs_dir: &Path) -> Result<FxHashSet<String>, PoolError>;
}

/// Merger that derives the actual set from artifact basenames under the
/// segment outputs directory, stripping known artifact name prefixes so
/// they compare against pool segment names.
pub struct DirMerger {
    pub artifact_prefixes: Vec<String>,
}

impl Default for DirMerger {
    fn default() -> Self {
        Self {
            artifact_prefixes: vec!["optimal_".to_string(), "all_".to_string()],
        }
    }
}

impl Merger for DirMerger {
    fn merge(&self, outputs_dir: &Path) -> Result<FxHashSet<String>, PoolError> {
        let mut actual = FxHashSet::default();
        for name in list_entries(outputs_dir) {
            let stripped = self
                .artifact_prefixes
                .iter()
                .find_map(|p| name.strip_prefix(p.as_str()))
                .unwrap_or(name.as_str());
            actual.insert(stripped.to_string());
        }
        Ok(actual)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub missing: Vec<String>,
    pub outcome: Outcome,
}

/// Pure set difference: missing = expected - actual, done iff nothing is
/// missing.
pub fn validate(expected: &[String], actual: &FxHashSet<String>) -> ValidationResult {
    let missing: Vec<String> = expected
        .iter()
        .filter(|name| !actual.contains(*name))
        .cloned()
        .sorted()
        .collect();
    let outcome = if missing.is_empty() {
        Outcome::Done
    } else {
        Outcome::Failed
    };
    ValidationResult { missing, outcome }
}

/// Validate and record the result durably: the missing list (when any)
/// and the validation token the cleanup step gates on.
pub fn run_validation(
    layout: &StoreLayout,
    expected: &[String],
    actual: &FxHashSet<String>,
) -> Result<ValidationResult, PoolError> {
    let result = validate(expected, actual);
    match result.outcome {
        Outcome::Done => {
            info!(expected = expected.len(), "validation OK");
            tokens::write_atomic(&tokens::validation_token_path(layout), "done")?;
        }
        Outcome::Failed => {
            warn!(missing = result.missing.len(), "validation found missing segments");
            let body = result.missing.join("\n") + "\n";
            tokens::write_atomic(&layout.missing_list_path(), &body)?;
            tokens::write_atomic(&tokens::validation_token_path(layout), "failed")?;
        }
    }
    Ok(result)
}

pub fn read_validation_outcome(layout: &StoreLayout) -> Option<Outcome> {
    let body = fs::read_to_string(tokens::validation_token_path(layout)).ok()?;
    match body.trim() {
        "done" => Some(Outcome::Done),
        _ => Some(Outcome::Failed),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    /// Validation did not pass; nothing was copied or deleted.
    Skipped,
    /// Results copied, transient work area kept for inspection.
    PreservedForDebug,
    /// Results copied, transient work area removed.
    Removed,
}

/// Destructive cleanup, gated on the validation token. Refuses to touch
/// anything unless validation recorded `done`.
pub fn cleanup(
    layout: &StoreLayout,
    final_dir: &Path,
    debug: bool,
) -> Result<CleanupAction, PoolError> {
    if read_validation_outcome(layout) != Some(Outcome::Done) {
        warn!("validation outcome is not done, refusing cleanup");
        tokens::write_atomic(
            &tokens::cleanup_failed_token_path(layout),
            "skipped: validation failed\n",
        )?;
        return Ok(CleanupAction::Skipped);
    }

    copy_dir_all(&layout.outputs_dir(), final_dir)?;
    info!(dest = %final_dir.display(), "merged outputs copied to final destination");

    if debug {
        info!("debug set, preserving work area");
        tokens::write_atomic(
            &tokens::cleanup_failed_token_path(layout),
            "debug: work area preserved\n",
        )?;
        return Ok(CleanupAction::PreservedForDebug);
    }

    for dir in transient_dirs(layout) {
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(PoolError::Io)?;
        }
    }
    tokens::write_atomic(&tokens::cleanup_done_token_path(layout), "done\n")?;
    Ok(CleanupAction::Removed)
}

fn transient_dirs(layout: &StoreLayout) -> [PathBuf; 4] {
    [
        layout.pool_dir(),
        layout.in_progress_dir(),
        layout.done_dir(),
        layout.failed_dir(),
    ]
}

fn copy_dir_all(src: &Path, dst: &Path) -> Result<(), PoolError> {
    fs::create_dir_all(dst).map_err(PoolError::Io)?;
    for entry in fs::read_dir(src).map_err(PoolError::Io)? {
        let entry = entry.map_err(PoolError::Io)?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(PoolError::Io)?;
        }
    }
    Ok(())
}
