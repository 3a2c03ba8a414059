use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::store::{Applied, QuestionActivity, UsageStore};
use super::task::{QuestionTask, TASK_TYPE_PRACTICE, TASK_TYPE_STUDY, TASK_TYPE_USAGE};
use crate::ports::{ProcessError, TaskProcessor};

/// Writes question study/practice counters and project usage counters.
pub struct QuestionTaskProcessor {
    store: Arc<dyn UsageStore>,
}

impl QuestionTaskProcessor {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    async fn sync_question(
        &self,
        task: &QuestionTask,
        activity: QuestionActivity,
    ) -> Result<(), ProcessError> {
        let question_id = task.question_id.ok_or_else(|| ProcessError::InvalidTask {
            task_type: task.task_type.clone(),
            reason: "missing question_id".to_string(),
        })?;

        let applied = self
            .store
            .record_question_activity(
                task.delivery_id,
                activity,
                task.user_id,
                question_id,
                task.time,
            )
            .await?;

        if applied == Applied::Duplicate {
            log_duplicate(task);
            return Ok(());
        }
        let action = match activity {
            QuestionActivity::Study => "synced_study_to_db",
            QuestionActivity::Practice => "synced_practice_to_db",
        };
        info!(
            action,
            user_id = task.user_id,
            question_id,
            applied = ?applied,
            "question activity synced"
        );
        Ok(())
    }

    async fn sync_usage(&self, task: &QuestionTask) -> Result<(), ProcessError> {
        let project_id = task.project_id.ok_or_else(|| ProcessError::InvalidTask {
            task_type: task.task_type.clone(),
            reason: "missing project_id".to_string(),
        })?;

        let applied = self
            .store
            .record_project_usage(task.delivery_id, task.user_id, project_id, task.time)
            .await?;

        if applied == Applied::Duplicate {
            log_duplicate(task);
            return Ok(());
        }
        info!(
            action = "synced_usage_to_db",
            user_id = task.user_id,
            project_id,
            applied = ?applied,
            "project usage synced"
        );
        Ok(())
    }
}

fn log_duplicate(task: &QuestionTask) {
    info!(
        action = "duplicate_delivery_skipped",
        task_type = %task.task_type,
        user_id = task.user_id,
        delivery_id = ?task.delivery_id,
        "delivery already applied, skipping"
    );
}

#[async_trait]
impl TaskProcessor for QuestionTaskProcessor {
    type Task = QuestionTask;

    async fn process_task(
        &self,
        _cancel: &CancellationToken,
        task: &QuestionTask,
    ) -> Result<(), ProcessError> {
        match task.task_type.as_str() {
            TASK_TYPE_STUDY => self.sync_question(task, QuestionActivity::Study).await,
            TASK_TYPE_PRACTICE => self.sync_question(task, QuestionActivity::Practice).await,
            TASK_TYPE_USAGE => self.sync_usage(task).await,
            other => Err(ProcessError::UnsupportedType(other.to_string())),
        }
    }

    fn supported_types(&self) -> Vec<&'static str> {
        vec![TASK_TYPE_STUDY, TASK_TYPE_PRACTICE, TASK_TYPE_USAGE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeliveryId;
    use crate::processors::question::InMemoryUsageStore;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn processor() -> (Arc<InMemoryUsageStore>, QuestionTaskProcessor) {
        let store = Arc::new(InMemoryUsageStore::new());
        let processor = QuestionTaskProcessor::new(store.clone());
        (store, processor)
    }

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn dispatches_each_type_to_its_counter() {
        let (store, processor) = processor();
        let cancel = CancellationToken::new();

        for task in [
            QuestionTask::study(1, 100, at()),
            QuestionTask::study(1, 100, at()),
            QuestionTask::practice(1, 100, at()),
            QuestionTask::usage(1, 5, at()),
        ] {
            processor.process_task(&cancel, &task).await.unwrap();
        }

        let question = store.question_usage(1, 100).await.unwrap();
        assert_eq!(question.study_count, 2);
        assert_eq!(question.practice_count, 1);
        assert_eq!(store.project_usage(1, 5).await.unwrap().usage_count, 1);
    }

    #[rstest]
    #[case::study_without_question("study")]
    #[case::practice_without_question("practice")]
    #[case::usage_without_project("usage")]
    #[tokio::test]
    async fn missing_target_id_is_invalid(#[case] task_type: &str) {
        let (_store, processor) = processor();
        let task = QuestionTask {
            task_type: task_type.to_string(),
            user_id: 1,
            question_id: None,
            project_id: None,
            time: at(),
            retry_count: 0,
            delivery_id: None,
        };

        let err = processor
            .process_task(&CancellationToken::new(), &task)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidTask { .. }));
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let (_store, processor) = processor();
        let mut task = QuestionTask::study(1, 1, at());
        task.task_type = "review".to_string();

        let err = processor
            .process_task(&CancellationToken::new(), &task)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::UnsupportedType(ref t) if t == "review"));
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_backend_error() {
        let (store, processor) = processor();
        store.set_offline(true);

        let err = processor
            .process_task(&CancellationToken::new(), &QuestionTask::usage(1, 1, at()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Backend(_)));
    }

    #[tokio::test]
    async fn redelivered_task_counts_once() {
        let (store, processor) = processor();
        let task = QuestionTask::practice(3, 7, at()).with_delivery_id(DeliveryId::new_at(at()));
        let cancel = CancellationToken::new();

        processor.process_task(&cancel, &task).await.unwrap();
        processor.process_task(&cancel, &task).await.unwrap();

        assert_eq!(store.question_usage(3, 7).await.unwrap().practice_count, 1);
    }

    #[test]
    fn unmarshal_reads_wire_payload() {
        let (_store, processor) = processor();
        let raw = br#"{"type":"usage","user_id":4,"project_id":2,"time":"2024-06-01T08:00:00Z","retry_count":1}"#;

        let task = processor.unmarshal(raw).unwrap();
        assert_eq!(task.project_id, Some(2));
        assert_eq!(task.retry_count, 1);
        assert_eq!(processor.supported_types(), vec!["study", "practice", "usage"]);
    }
}
