//! Usage store port and its in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::DeliveryId;
use crate::ports::ProcessError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("usage store unavailable: {0}")]
    Unavailable(String),

    #[error("usage store query failed: {0}")]
    Query(String),
}

impl From<StoreError> for ProcessError {
    fn from(err: StoreError) -> Self {
        ProcessError::Backend(Box::new(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionActivity {
    Study,
    Practice,
}

impl QuestionActivity {
    /// Counter bumped by this activity.
    pub fn counter_field(&self) -> &'static str {
        match self {
            QuestionActivity::Study => "study_count",
            QuestionActivity::Practice => "practice_count",
        }
    }

    /// Timestamp moved by this activity.
    pub fn last_at_field(&self) -> &'static str {
        match self {
            QuestionActivity::Study => "last_studied_at",
            QuestionActivity::Practice => "last_practiced_at",
        }
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    /// The delivery id was already applied; nothing changed.
    Duplicate,
}

/// Per-(user, question) counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionUsage {
    pub user_id: u64,
    pub question_id: u64,
    pub study_count: u64,
    pub practice_count: u64,
    pub last_studied_at: Option<DateTime<Utc>>,
    pub last_practiced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuestionUsage {
    fn empty(user_id: u64, question_id: u64, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            question_id,
            study_count: 0,
            practice_count: 0,
            last_studied_at: None,
            last_practiced_at: None,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Per-(user, project) counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectUsage {
    pub user_id: u64,
    pub project_id: u64,
    pub usage_count: u64,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence for question and project usage counters.
///
/// Writes are upserts: the first event for a key creates the row, later ones
/// bump a counter and move the matching timestamp. When `delivery` is set,
/// implementations should apply each id at most once and report
/// [`Applied::Duplicate`] for replays.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record_question_activity(
        &self,
        delivery: Option<DeliveryId>,
        activity: QuestionActivity,
        user_id: u64,
        question_id: u64,
        at: DateTime<Utc>,
    ) -> Result<Applied, StoreError>;

    async fn record_project_usage(
        &self,
        delivery: Option<DeliveryId>,
        user_id: u64,
        project_id: u64,
        at: DateTime<Utc>,
    ) -> Result<Applied, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    questions: HashMap<(u64, u64), QuestionUsage>,
    projects: HashMap<(u64, u64), ProjectUsage>,
    applied: HashSet<DeliveryId>,
}

/// Process-local [`UsageStore`] for tests and demo runs.
///
/// Applied delivery ids are kept for the life of the store, so it is not
/// meant for long-running processes; use
/// [`RedisUsageStore`](super::RedisUsageStore) there. Can be switched offline
/// to simulate a database outage.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    tables: Mutex<Tables>,
    offline: AtomicBool,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every write fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn question_usage(&self, user_id: u64, question_id: u64) -> Option<QuestionUsage> {
        self.tables
            .lock()
            .await
            .questions
            .get(&(user_id, question_id))
            .cloned()
    }

    pub async fn project_usage(&self, user_id: u64, project_id: u64) -> Option<ProjectUsage> {
        self.tables
            .lock()
            .await
            .projects
            .get(&(user_id, project_id))
            .cloned()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn record_question_activity(
        &self,
        delivery: Option<DeliveryId>,
        activity: QuestionActivity,
        user_id: u64,
        question_id: u64,
        at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.lock().await;
        if delivery.is_some_and(|id| !tables.applied.insert(id)) {
            return Ok(Applied::Duplicate);
        }

        let key = (user_id, question_id);
        let applied = if tables.questions.contains_key(&key) {
            Applied::Updated
        } else {
            Applied::Inserted
        };
        let row = tables
            .questions
            .entry(key)
            .or_insert_with(|| QuestionUsage::empty(user_id, question_id, at));
        match activity {
            QuestionActivity::Study => {
                row.study_count += 1;
                row.last_studied_at = Some(at);
            }
            QuestionActivity::Practice => {
                row.practice_count += 1;
                row.last_practiced_at = Some(at);
            }
        }
        row.updated_at = at;
        Ok(applied)
    }

    async fn record_project_usage(
        &self,
        delivery: Option<DeliveryId>,
        user_id: u64,
        project_id: u64,
        at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        self.ensure_online()?;
        let mut tables = self.tables.lock().await;
        if delivery.is_some_and(|id| !tables.applied.insert(id)) {
            return Ok(Applied::Duplicate);
        }

        let key = (user_id, project_id);
        match tables.projects.get_mut(&key) {
            Some(row) => {
                row.usage_count += 1;
                row.last_used_at = at;
                row.updated_at = at;
                Ok(Applied::Updated)
            }
            None => {
                tables.projects.insert(
                    key,
                    ProjectUsage {
                        user_id,
                        project_id,
                        usage_count: 1,
                        last_used_at: at,
                        created_at: at,
                        updated_at: at,
                    },
                );
                Ok(Applied::Inserted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn study_and_practice_share_one_row() {
        let store = InMemoryUsageStore::new();

        let first = store
            .record_question_activity(None, QuestionActivity::Study, 1, 10, t0())
            .await
            .unwrap();
        let later = t0() + Duration::minutes(5);
        let second = store
            .record_question_activity(None, QuestionActivity::Practice, 1, 10, later)
            .await
            .unwrap();

        assert_eq!(first, Applied::Inserted);
        assert_eq!(second, Applied::Updated);
        let row = store.question_usage(1, 10).await.unwrap();
        assert_eq!(row.study_count, 1);
        assert_eq!(row.practice_count, 1);
        assert_eq!(row.last_studied_at, Some(t0()));
        assert_eq!(row.last_practiced_at, Some(later));
        assert_eq!(row.created_at, t0());
        assert_eq!(row.updated_at, later);
    }

    #[tokio::test]
    async fn project_usage_counts_up() {
        let store = InMemoryUsageStore::new();

        for minute in 0..3 {
            store
                .record_project_usage(None, 2, 9, t0() + Duration::minutes(minute))
                .await
                .unwrap();
        }

        let row = store.project_usage(2, 9).await.unwrap();
        assert_eq!(row.usage_count, 3);
        assert_eq!(row.last_used_at, t0() + Duration::minutes(2));
        assert!(store.project_usage(2, 10).await.is_none());
    }

    #[tokio::test]
    async fn replayed_delivery_is_applied_once() {
        let store = InMemoryUsageStore::new();
        let id = DeliveryId::new_at(t0());

        let first = store
            .record_question_activity(Some(id), QuestionActivity::Study, 1, 10, t0())
            .await
            .unwrap();
        let replay = store
            .record_question_activity(Some(id), QuestionActivity::Study, 1, 10, t0())
            .await
            .unwrap();

        assert_eq!(first, Applied::Inserted);
        assert_eq!(replay, Applied::Duplicate);
        assert_eq!(store.question_usage(1, 10).await.unwrap().study_count, 1);
    }

    #[tokio::test]
    async fn failed_write_does_not_consume_the_delivery_id() {
        let store = InMemoryUsageStore::new();
        let id = DeliveryId::new_at(t0());

        store.set_offline(true);
        let err = store
            .record_project_usage(Some(id), 1, 1, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_offline(false);
        let applied = store.record_project_usage(Some(id), 1, 1, t0()).await.unwrap();
        assert_eq!(applied, Applied::Inserted);
    }
}
