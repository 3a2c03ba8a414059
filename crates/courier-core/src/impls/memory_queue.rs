//! InMemoryQueueProvider - process-local queue backend.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{QueueError, QueueProvider};

/// One FIFO of serialized tasks per queue key.
///
/// Each operation completes under a single lock acquisition, which gives the
/// atomic pop the worker relies on. Nothing survives the process.
#[derive(Default)]
pub struct InMemoryQueueProvider {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
}

impl InMemoryQueueProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the items currently queued under `queue_key`, oldest first.
    pub async fn snapshot(&self, queue_key: &str) -> Vec<String> {
        let queues = self.queues.lock().await;
        queues
            .get(queue_key)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueProvider for InMemoryQueueProvider {
    async fn push(&self, queue_key: &str, task_data: &str) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        queues
            .entry(queue_key.to_string())
            .or_default()
            .push_back(task_data.to_string());
        Ok(())
    }

    async fn pop(&self, queue_key: &str) -> Result<Option<String>, QueueError> {
        let mut queues = self.queues.lock().await;
        Ok(queues.get_mut(queue_key).and_then(VecDeque::pop_front))
    }

    async fn length(&self, queue_key: &str) -> Result<i64, QueueError> {
        let queues = self.queues.lock().await;
        Ok(queues.get(queue_key).map_or(0, |queue| queue.len() as i64))
    }
}
