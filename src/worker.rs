use crate::store::{Outcome, SegmentStore};
use crate::tokens;
use crate::PoolError;
use serde::Serialize;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// External processing collaborator: given a claimed segment reference,
/// produce output artifacts and report success or failure.
pub trait Processor {
    fn process(&self, segment: &str, work_path: &Path) -> Result<(), PoolError>;
}

/// Processor that shells out to a configured program, passing the claimed
/// segment path as the final argument. Retries with linear backoff before
/// declaring the segment failed.
pub struct CommandProcessor {
    pub program: String,
    pub args: Vec<String>,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Processor for CommandProcessor {
    fn process(&self, segment: &str, work_path: &Path) -> Result<(), PoolError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = Command::new(&self.program)
                .args(&self.args)
                .arg(work_path)
                .output();
            match result {
                Ok(output) if output.status.success() => return Ok(()),
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(
                        segment,
                        attempt,
                        code = output.status.code().unwrap_or(-1),
                        stderr = %stderr.chars().take(2000).collect::<String>(),
                        "processor exited non-zero"
                    );
                }
                Err(e) => {
                    warn!(segment, attempt, error = %e, "failed to spawn processor");
                }
            }
            if attempt > self.max_retries {
                return Err(PoolError::Processing(format!(
                    "{} failed after {} attempts",
                    segment, attempt
                )));
            }
            std::thread::sleep(self.backoff * attempt);
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub segments_per_claim: usize,
    pub poll_interval: Duration,
    /// Terminal "no more work" signal: exit after this long without a
    /// successful take.
    pub max_idle: Duration,
    /// Claim directly from the pool when the queue runs dry. Used when
    /// running without a dispatcher.
    pub direct_claim: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub done: usize,
    pub failed: usize,
}

#[derive(Serialize)]
struct LogEvent {
    ts: u64,
    segment: String,
    event: &'static str,
}

/// Diagnostic activity log, flushed to worker_logs after every batch.
/// Logging failures never fail the worker.
#[derive(Serialize)]
struct WorkerLog {
    worker_id: String,
    hostname: String,
    started_at: u64,
    events: Vec<LogEvent>,
}

impl WorkerLog {
    fn new(worker_id: &str) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            hostname: tokens::read_hostname(),
            started_at: tokens::unix_now(),
            events: Vec::new(),
        }
    }

    fn record(&mut self, segment: &str, event: &'static str) {
        self.events.push(LogEvent {
            ts: tokens::unix_now(),
            segment: segment.to_string(),
            event,
        });
    }

    fn flush(&self, store: &SegmentStore) {
        let path = store
            .layout()
            .worker_logs_dir()
            .join(format!("worker_{}.log", self.worker_id));
        match serde_json::to_string_pretty(self) {
            Ok(body) => {
                if let Err(e) = tokens::write_atomic(&path, &body) {
                    warn!(error = %e, "failed to flush worker log");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize worker log"),
        }
    }
}

/// A worker process: repeatedly takes a batch from its queue, runs the
/// processor on each segment, and deposits every segment into done or
/// failed. Writes its completion token on normal exit.
pub struct Worker<P: Processor> {
    store: SegmentStore,
    processor: P,
    config: WorkerConfig,
}

impl<P: Processor> Worker<P> {
    pub fn new(store: SegmentStore, processor: P, config: WorkerConfig) -> Self {
        Self {
            store,
            processor,
            config,
        }
    }

    fn touch_heartbeat(&self) {
        let path = self
            .store
            .layout()
            .worker_logs_dir()
            .join(format!("worker_{}.heartbeat", self.config.worker_id));
        if let Err(e) = std::fs::write(&path, tokens::unix_now().to_string()) {
            warn!(error = %e, "failed to touch heartbeat");
        }
    }

    fn next_batch(&self) -> Result<Vec<String>, PoolError> {
        let id = &self.config.worker_id;
        let batch = self.store.take(id, self.config.segments_per_claim)?;
        if !batch.is_empty() || !self.config.direct_claim {
            return Ok(batch);
        }
        self.store.claim(id, self.config.segments_per_claim)?;
        self.store.take(id, self.config.segments_per_claim)
    }

    /// Run until no work has been seen for `max_idle`, or until the
    /// dispatcher has exited and the queue stays empty.
    pub fn run(&self) -> Result<WorkerSummary, PoolError> {
        let id = self.config.worker_id.clone();
        self.store.layout().initialize_worker(&id)?;

        let mut log = WorkerLog::new(&id);
        log.flush(&self.store);

        let mut summary = WorkerSummary::default();
        let mut last_work = Instant::now();

        loop {
            self.touch_heartbeat();

            let batch = self.next_batch()?;
            if batch.is_empty() {
                let idle_timeout = last_work.elapsed() > self.config.max_idle;
                let dispatcher_gone = tokens::dispatcher_done(self.store.layout());
                if idle_timeout || dispatcher_gone {
                    if idle_timeout {
                        info!(worker = %id, "no work for idle limit, exiting");
                    } else {
                        info!(worker = %id, "dispatcher done and queue empty, exiting");
                    }
                    break;
                }
                std::thread::sleep(self.config.poll_interval);
                continue;
            }

            last_work = Instant::now();
            for segment in &batch {
                log.record(segment, "claimed");
                let work_path = self.store.layout().active_dir(&id).join(segment);
                let outcome = match self.processor.process(segment, &work_path) {
                    Ok(()) => {
                        log.record(segment, "processed");
                        summary.done += 1;
                        Outcome::Done
                    }
                    Err(e) => {
                        // A bad segment never aborts the rest of the batch
                        error!(worker = %id, segment = %segment, error = %e, "segment processing failed");
                        log.record(segment, "failed");
                        summary.failed += 1;
                        Outcome::Failed
                    }
                };
                self.store.release(&id, segment, outcome)?;
            }
            log.flush(&self.store);
        }

        log.flush(&self.store);
        tokens::write_worker_token(self.store.layout(), &id)?;
        Ok(summary)
    }
}
