use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DeliveryId, Task};

pub const TASK_TYPE_STUDY: &str = "study";
pub const TASK_TYPE_PRACTICE: &str = "practice";
pub const TASK_TYPE_USAGE: &str = "usage";

/// A question-related usage event waiting to be written to the store.
///
/// `study` and `practice` carry `question_id`; `usage` carries `project_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionTask {
    #[serde(rename = "type")]
    pub task_type: String,

    pub user_id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,

    /// When the event happened. Also the task's creation time.
    pub time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<DeliveryId>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl QuestionTask {
    pub fn study(user_id: u64, question_id: u64, at: DateTime<Utc>) -> Self {
        Self::for_question(TASK_TYPE_STUDY, user_id, question_id, at)
    }

    pub fn practice(user_id: u64, question_id: u64, at: DateTime<Utc>) -> Self {
        Self::for_question(TASK_TYPE_PRACTICE, user_id, question_id, at)
    }

    pub fn usage(user_id: u64, project_id: u64, at: DateTime<Utc>) -> Self {
        Self {
            task_type: TASK_TYPE_USAGE.to_string(),
            user_id,
            question_id: None,
            project_id: Some(project_id),
            time: at,
            retry_count: 0,
            delivery_id: None,
        }
    }

    pub fn with_delivery_id(mut self, delivery_id: DeliveryId) -> Self {
        self.delivery_id = Some(delivery_id);
        self
    }

    fn for_question(task_type: &str, user_id: u64, question_id: u64, at: DateTime<Utc>) -> Self {
        Self {
            task_type: task_type.to_string(),
            user_id,
            question_id: Some(question_id),
            project_id: None,
            time: at,
            retry_count: 0,
            delivery_id: None,
        }
    }
}

impl Task for QuestionTask {
    fn task_type(&self) -> &str {
        &self.task_type
    }

    fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.time
    }
}
