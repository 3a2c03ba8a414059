//! Producer side: serialize a task and push it onto a queue.

use thiserror::Error;
use tracing::debug;

use crate::domain::Task;
use crate::ports::{QueueError, QueueProvider};

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("serialize task: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("serialized task is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Push `task` onto `queue_key`. Queue errors are returned to the caller.
pub async fn enqueue<T: Task>(
    queue: &dyn QueueProvider,
    queue_key: &str,
    task: &T,
) -> Result<(), EnqueueError> {
    let data = String::from_utf8(task.marshal()?)?;
    queue.push(queue_key, &data).await?;
    debug!(
        action = "task_enqueued",
        queue_key,
        task_type = task.task_type(),
        "task enqueued"
    );
    Ok(())
}
