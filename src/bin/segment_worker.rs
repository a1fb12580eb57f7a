use clap::Parser;
use segpool::layout::StoreLayout;
use segpool::store::SegmentStore;
use segpool::worker::{CommandProcessor, Worker, WorkerConfig};
use segpool::PoolError;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "segment_worker")]
#[command(about = "Claim segments, run the processing command on each, deposit done/failed", long_about = None)]
struct Cli {
    /// Base directory of the shared segment store
    #[arg(long)]
    base_dir: PathBuf,
    /// Worker identifier; defaults to the process id
    #[arg(long)]
    worker_id: Option<String>,
    #[arg(long, default_value_t = 1)]
    segments_per_claim: usize,
    #[arg(long, default_value_t = 2)]
    poll_interval_seconds: u64,
    /// Exit after this long without new work
    #[arg(long, default_value_t = 600)]
    max_idle_seconds: u64,
    /// Claim directly from the pool instead of waiting for a dispatcher
    #[arg(long, default_value_t = false)]
    direct_claim: bool,
    /// Processing command; the claimed segment path is appended
    #[arg(long)]
    program: String,
    /// Extra arguments passed to the processing command
    #[arg(long)]
    program_arg: Vec<String>,
    #[arg(long, default_value_t = 2)]
    max_retries: u32,
    #[arg(long, default_value_t = 2)]
    backoff_seconds: u64,
}

fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let worker_id = cli
        .worker_id
        .unwrap_or_else(|| std::process::id().to_string());

    let layout = StoreLayout::new(cli.base_dir);
    layout.initialize()?;

    let processor = CommandProcessor {
        program: cli.program,
        args: cli.program_arg,
        max_retries: cli.max_retries,
        backoff: Duration::from_secs(cli.backoff_seconds),
    };
    let config = WorkerConfig {
        worker_id: worker_id.clone(),
        segments_per_claim: cli.segments_per_claim,
        poll_interval: Duration::from_secs(cli.poll_interval_seconds),
        max_idle: Duration::from_secs(cli.max_idle_seconds),
        direct_claim: cli.direct_claim,
    };

    let worker = Worker::new(SegmentStore::new(layout), processor, config);
    let summary = worker.run()?;
    println!(
        "[segment_worker] worker {} finished: {} done, {} failed",
        worker_id, summary.done, summary.failed
    );
    Ok(())
}
