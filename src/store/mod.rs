//! File-backed, append-only record stores.
//!
//! Two independent date-partitioned trees of one-JSON-file-per-record:
//! the webhook event log (raw inbound events) and the pipeline job log
//! (per-product processing trails). Every read-modify-write goes through a
//! per-record sidecar lock and is flushed to stable storage before the lock
//! is released.

pub mod lock;
pub mod pipeline_log;
pub mod webhook_log;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    /// Another writer held the record lock past the bounded wait. Callers
    /// may retry with backoff.
    #[error("timed out waiting for lock on {0}")]
    LockTimeout(PathBuf),
    #[error("log io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("log record parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
