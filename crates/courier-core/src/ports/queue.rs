//! QueueProvider port - FIFO queue backends keyed by name.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),

    #[error("queue command failed: {0}")]
    Command(String),

    #[error("invalid queue configuration: {0}")]
    Configuration(String),
}

/// Queue backend abstraction.
///
/// Items pushed with `push` come back from `pop` oldest first. A retried
/// task goes through `push` again and therefore joins the back of the line.
/// Backends must make `pop` atomic; the framework takes no locks of its own.
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Insert at the "new work" end. Backend failures must be returned, never
    /// swallowed.
    async fn push(&self, queue_key: &str, task_data: &str) -> Result<(), QueueError>;

    /// Remove one item from the "oldest work" end. `Ok(None)` means the queue
    /// is empty, which is not an error.
    async fn pop(&self, queue_key: &str) -> Result<Option<String>, QueueError>;

    /// Current number of items. Observability only.
    async fn length(&self, queue_key: &str) -> Result<i64, QueueError>;
}
