use clap::{Parser, Subcommand};
use segpool::layout::StoreLayout;
use segpool::reconciler::{self, CleanupAction, DirMerger, Merger};
use segpool::store::Outcome;
use segpool::tokens;
use segpool::PoolError;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reconcile")]
#[command(about = "Validate produced outputs against the expected list, then gate cleanup", long_about = None)]
struct Cli {
    /// Base directory of the shared segment store
    #[arg(long)]
    base_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare expected segments against produced outputs
    Validate,
    /// Copy merged outputs to the final destination and remove the work
    /// area, refusing unless validation passed
    Cleanup {
        #[arg(long)]
        final_dir: PathBuf,
        /// Preserve the work area for inspection
        #[arg(long, default_value_t = false)]
        debug: bool,
    },
}

fn read_expected(layout: &StoreLayout) -> Result<Vec<String>, PoolError> {
    let body = fs::read_to_string(layout.expected_list_path()).map_err(PoolError::Io)?;
    Ok(body.lines().map(|l| l.to_string()).filter(|l| !l.is_empty()).collect())
}

fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let layout = StoreLayout::new(cli.base_dir);

    match cli.command {
        Commands::Validate => {
            let worker_ids = layout.list_worker_ids()?;
            if !tokens::all_workers_done(&layout, &worker_ids) {
                return Err(PoolError::Config(
                    "not all workers have emitted their completion token".to_string(),
                ));
            }
            let expected = read_expected(&layout)?;
            let actual = DirMerger::default().merge(&layout.segment_outputs_dir())?;
            let result = reconciler::run_validation(&layout, &expected, &actual)?;
            match result.outcome {
                Outcome::Done => println!("[reconcile] validation OK"),
                Outcome::Failed => {
                    println!("[reconcile] missing segments: {}", result.missing.len())
                }
            }
        }
        Commands::Cleanup { final_dir, debug } => {
            let action = reconciler::cleanup(&layout, &final_dir, debug)?;
            match action {
                CleanupAction::Skipped => {
                    println!("[reconcile] cleanup skipped: validation did not pass")
                }
                CleanupAction::PreservedForDebug => {
                    println!("[reconcile] outputs copied, work area preserved (debug)")
                }
                CleanupAction::Removed => println!("[reconcile] outputs copied, work area removed"),
            }
        }
    }
    Ok(())
}
