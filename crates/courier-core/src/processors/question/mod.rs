//! Question usage sync.
//!
//! The API records study / practice / project-usage events by pushing a
//! [`QuestionTask`] instead of writing counters inline. A worker bound to
//! [`QUESTION_SYNC_QUEUE`] runs [`QuestionTaskProcessor`], which upserts the
//! counters through a [`UsageStore`]: [`RedisUsageStore`] in production,
//! [`InMemoryUsageStore`] in tests and demo runs.

mod processor;
mod producer;
mod redis_store;
mod store;
mod task;

pub use self::processor::QuestionTaskProcessor;
pub use self::producer::QuestionTaskProducer;
pub use self::redis_store::{DEFAULT_DEDUP_TTL, DEFAULT_KEY_PREFIX, RedisUsageStore};
pub use self::store::{
    Applied, InMemoryUsageStore, ProjectUsage, QuestionActivity, QuestionUsage, StoreError,
    UsageStore,
};
pub use self::task::{QuestionTask, TASK_TYPE_PRACTICE, TASK_TYPE_STUDY, TASK_TYPE_USAGE};

/// Queue key the question sync worker drains.
pub const QUESTION_SYNC_QUEUE: &str = "sync:question:usage";

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::impls::InMemoryQueueProvider;
    use crate::ports::QueueProvider;
    use crate::worker::{ExponentialBackoff, ManagedWorker, Worker, WorkerConfig};

    async fn synced(store: &InMemoryUsageStore) -> bool {
        store.question_usage(1, 10).await.is_some() && store.project_usage(1, 3).await.is_some()
    }

    #[tokio::test]
    async fn worker_syncs_produced_events_after_store_recovers() {
        let queue = Arc::new(InMemoryQueueProvider::new());
        let store = Arc::new(InMemoryUsageStore::new());
        let producer = QuestionTaskProducer::new(queue.clone());
        let worker = Worker::new(
            WorkerConfig::new("question-sync-worker", QUESTION_SYNC_QUEUE)
                .with_poll_interval(Duration::from_millis(20))
                .with_max_retries(100),
            Arc::new(QuestionTaskProcessor::new(store.clone())),
            queue.clone(),
        )
        .unwrap()
        .with_retry_policy(ExponentialBackoff {
            base_delay: Duration::from_millis(10),
            multiplier: 1.0,
            max_delay: Duration::from_millis(10),
            jitter: false,
        });

        store.set_offline(true);
        producer.record_study(1, 10).await.unwrap();
        producer.record_usage(1, 3).await.unwrap();

        let root = CancellationToken::new();
        worker.start(&root).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.set_offline(false);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !synced(&store).await && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        worker.stop(Duration::from_secs(1)).await.unwrap();

        assert!(synced(&store).await);
        assert_eq!(store.question_usage(1, 10).await.unwrap().study_count, 1);
        assert_eq!(store.project_usage(1, 3).await.unwrap().usage_count, 1);
        assert_eq!(queue.length(QUESTION_SYNC_QUEUE).await.unwrap(), 0);
    }
}
