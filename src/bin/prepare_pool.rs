use clap::Parser;
use segpool::layout::StoreLayout;
use segpool::preparer::{self, DirCohort};
use segpool::store::SegmentStore;
use segpool::PoolError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prepare_pool")]
#[command(about = "Build the segment pool from a cohort and recover prior state", long_about = None)]
struct Cli {
    /// Base directory of the shared segment store
    #[arg(long)]
    base_dir: PathBuf,
    /// Directory containing the cohort's segment files
    #[arg(long)]
    cohort_dir: PathBuf,
    /// Hard reset: drop completion tokens and clear failed/in_progress
    #[arg(long, default_value_t = false)]
    restart: bool,
}

fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let layout = StoreLayout::new(cli.base_dir);
    layout.initialize()?;
    let store = SegmentStore::new(layout);
    let cohort = DirCohort::new(cli.cohort_dir);

    let expected = preparer::prepare(&store, &cohort, cli.restart)?;
    println!("[prepare_pool] pool ready with {} segment(s)", expected.len());
    Ok(())
}
