//! TaskProcessor port - the business-logic adapter a worker drives.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::Task;

/// Why a task could not be decoded or processed.
///
/// `Decode` errors are never retried by the worker. Everything else counts as
/// a processing failure and goes through the retry budget.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("decode task payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unsupported task type: {0}")]
    UnsupportedType(String),

    #[error("invalid '{task_type}' task: {reason}")]
    InvalidTask { task_type: String, reason: String },

    #[error("backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{0}")]
    Other(String),
}

/// Executes and (de)serializes one family of related task types.
///
/// `process_task` may run more than once for the same logical task (delivery
/// is at-least-once), so effects must tolerate duplicates.
///
/// The token is the worker's cancellation signal. The worker never aborts an
/// in-flight task; long-running processors may watch the token at I/O
/// boundaries to let shutdown finish sooner.
#[async_trait]
pub trait TaskProcessor: Send + Sync + 'static {
    type Task: Task;

    async fn process_task(
        &self,
        cancel: &CancellationToken,
        task: &Self::Task,
    ) -> Result<(), ProcessError>;

    /// Inverse of [`Task::marshal`].
    fn unmarshal(&self, data: &[u8]) -> Result<Self::Task, ProcessError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Type tags this processor is prepared to handle. Informational only:
    /// the worker does not dispatch on it.
    fn supported_types(&self) -> Vec<&'static str>;
}
