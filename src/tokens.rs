use crate::layout::StoreLayout;
use crate::PoolError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Durable marker a worker writes exactly once when it exits normally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerToken {
    pub worker_id: String,
    pub hostname: String,
    pub finished_at: u64,
}

/// Durable marker the dispatcher writes when the idle threshold is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherToken {
    pub cycles: u64,
    pub finished_at: u64,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Hostname for worker tokens, read the kernel's view first so the token
/// identifies the machine even when HOSTNAME is not exported.
pub fn read_hostname() -> String {
    if let Ok(name) = fs::read_to_string("/proc/sys/kernel/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

/// Write a file durably: temp name in the same directory, then atomic
/// rename. Readers never observe a half-written token.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), PoolError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(PoolError::Io)?;
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("token");
    let tmp = dir.join(format!(".{}.tmp.{}", file_name, std::process::id()));
    fs::write(&tmp, contents).map_err(PoolError::Io)?;
    fs::rename(&tmp, path).map_err(PoolError::Io)?;
    Ok(())
}

pub fn worker_token_path(layout: &StoreLayout, worker_id: &str) -> std::path::PathBuf {
    layout.outputs_dir().join(format!("worker_{}.done", worker_id))
}

pub fn dispatcher_token_path(layout: &StoreLayout) -> std::path::PathBuf {
    layout.outputs_dir().join("dispatcher.done")
}

pub fn validation_token_path(layout: &StoreLayout) -> std::path::PathBuf {
    layout.outputs_dir().join("validation_done.token")
}

pub fn cleanup_done_token_path(layout: &StoreLayout) -> std::path::PathBuf {
    layout.outputs_dir().join("cleanup_done.token")
}

pub fn cleanup_failed_token_path(layout: &StoreLayout) -> std::path::PathBuf {
    layout.outputs_dir().join("cleanup_failed.token")
}

pub fn write_worker_token(layout: &StoreLayout, worker_id: &str) -> Result<(), PoolError> {
    let token = WorkerToken {
        worker_id: worker_id.to_string(),
        hostname: read_hostname(),
        finished_at: unix_now(),
    };
    let body = serde_json::to_string_pretty(&token)?;
    write_atomic(&worker_token_path(layout, worker_id), &body)
}

pub fn write_dispatcher_token(layout: &StoreLayout, cycles: u64) -> Result<(), PoolError> {
    let token = DispatcherToken {
        cycles,
        finished_at: unix_now(),
    };
    let body = serde_json::to_string_pretty(&token)?;
    write_atomic(&dispatcher_token_path(layout), &body)
}

pub fn dispatcher_done(layout: &StoreLayout) -> bool {
    dispatcher_token_path(layout).exists()
}

pub fn all_workers_done(layout: &StoreLayout, worker_ids: &[String]) -> bool {
    worker_ids
        .iter()
        .all(|id| worker_token_path(layout, id).exists())
}

/// Remove every completion token. Used by the preparer on a full restart.
pub fn drop_all_tokens(layout: &StoreLayout) -> Result<(), PoolError> {
    let outputs = layout.outputs_dir();
    if !outputs.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(&outputs).map_err(PoolError::Io)? {
        let entry = entry.map_err(PoolError::Io)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        let is_token = name.ends_with(".done") || name.ends_with(".token");
        if is_token {
            fs::remove_file(&path).map_err(PoolError::Io)?;
        }
    }
    Ok(())
}
