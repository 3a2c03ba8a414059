use std::sync::Arc;

use super::QUESTION_SYNC_QUEUE;
use super::task::QuestionTask;
use crate::domain::DeliveryId;
use crate::ports::{Clock, QueueProvider, SystemClock};
use crate::producer::{EnqueueError, enqueue};

/// API-side handle that records question events as queued tasks.
///
/// Each call stamps a fresh [`DeliveryId`] and returns it.
pub struct QuestionTaskProducer<C: Clock = SystemClock> {
    queue: Arc<dyn QueueProvider>,
    queue_key: String,
    clock: C,
}

impl QuestionTaskProducer<SystemClock> {
    pub fn new(queue: Arc<dyn QueueProvider>) -> Self {
        Self::with_clock(queue, SystemClock)
    }
}

impl<C: Clock> QuestionTaskProducer<C> {
    pub fn with_clock(queue: Arc<dyn QueueProvider>, clock: C) -> Self {
        Self {
            queue,
            queue_key: QUESTION_SYNC_QUEUE.to_string(),
            clock,
        }
    }

    pub fn with_queue_key(mut self, queue_key: impl Into<String>) -> Self {
        self.queue_key = queue_key.into();
        self
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    pub async fn record_study(
        &self,
        user_id: u64,
        question_id: u64,
    ) -> Result<DeliveryId, EnqueueError> {
        let now = self.clock.now();
        self.submit(QuestionTask::study(user_id, question_id, now))
            .await
    }

    pub async fn record_practice(
        &self,
        user_id: u64,
        question_id: u64,
    ) -> Result<DeliveryId, EnqueueError> {
        let now = self.clock.now();
        self.submit(QuestionTask::practice(user_id, question_id, now))
            .await
    }

    pub async fn record_usage(
        &self,
        user_id: u64,
        project_id: u64,
    ) -> Result<DeliveryId, EnqueueError> {
        let now = self.clock.now();
        self.submit(QuestionTask::usage(user_id, project_id, now))
            .await
    }

    async fn submit(&self, task: QuestionTask) -> Result<DeliveryId, EnqueueError> {
        let delivery_id = DeliveryId::new_at(task.time);
        let task = task.with_delivery_id(delivery_id);
        enqueue(self.queue.as_ref(), &self.queue_key, &task).await?;
        Ok(delivery_id)
    }
}
