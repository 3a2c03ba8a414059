use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to callers of the worker lifecycle API.
///
/// Task-level failures never show up here: they are handled (retried or
/// discarded) inside the drain loop and only reported through logs.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker '{0}' already registered")]
    AlreadyRegistered(String),

    #[error("worker '{0}' has already been started")]
    AlreadyStarted(String),

    #[error("invalid worker config: {0}")]
    InvalidConfig(String),

    #[error("worker '{worker}' shutdown timeout exceeded ({timeout:?})")]
    StopTimeout { worker: String, timeout: Duration },

    #[error("worker '{0}' is already being stopped by another caller")]
    StopInProgress(String),

    #[error("worker '{worker}' poll loop crashed: {reason}")]
    Crashed { worker: String, reason: String },

    #[error("failed to start {} worker(s): {}", .0.len(), describe(.0))]
    StartFailed(Vec<(String, WorkerError)>),

    #[error("failed to stop {} worker(s): {}", .0.len(), describe(.0))]
    StopFailed(Vec<(String, WorkerError)>),
}

impl WorkerError {
    /// Registration names of the workers behind an aggregate error.
    pub fn failed_workers(&self) -> Vec<&str> {
        match self {
            WorkerError::StartFailed(failures) | WorkerError::StopFailed(failures) => {
                failures.iter().map(|(name, _)| name.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn describe(failures: &[(String, WorkerError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("worker '{name}': {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
