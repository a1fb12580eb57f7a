use clap::Parser;
use segpool::dispatcher::{Dispatcher, DispatcherConfig};
use segpool::layout::StoreLayout;
use segpool::store::SegmentStore;
use segpool::PoolError;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "dispatcher")]
#[command(about = "Replenish worker queues from the pool until the batch goes quiet", long_about = None)]
struct Cli {
    /// Base directory of the shared segment store
    #[arg(long)]
    base_dir: PathBuf,
    /// Number of workers to feed (ids 1..=workers)
    #[arg(long)]
    workers: usize,
    #[arg(long, default_value_t = 1)]
    segments_per_claim: usize,
    #[arg(long, default_value_t = 1)]
    poll_interval_seconds: u64,
    /// Consecutive quiet polls before the dispatcher exits
    #[arg(long, default_value_t = 30)]
    max_idle_cycles: u32,
}

fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let layout = StoreLayout::new(cli.base_dir);
    layout.initialize()?;

    let config = DispatcherConfig {
        workers: cli.workers,
        segments_per_claim: cli.segments_per_claim,
        poll_interval: Duration::from_secs(cli.poll_interval_seconds),
        max_idle_cycles: cli.max_idle_cycles,
    };
    let cycles = Dispatcher::new(SegmentStore::new(layout), config).run()?;
    println!("[dispatcher] exited after {} cycle(s)", cycles);
    Ok(())
}
