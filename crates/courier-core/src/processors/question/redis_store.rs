//! RedisUsageStore - usage counters as Redis hashes.
//!
//! Layout (prefix defaults to `courier:usage`):
//! - `{prefix}:question:{user_id}:{question_id}`: `study_count`,
//!   `practice_count`, `last_studied_at`, `last_practiced_at`, `created_at`,
//!   `updated_at`
//! - `{prefix}:project:{user_id}:{project_id}`: `usage_count`,
//!   `last_used_at`, `created_at`, `updated_at`
//! - `{prefix}:delivery:{ulid}`: applied delivery marker, expires after the
//!   dedup TTL
//!
//! The dedup check, the counter write and the marker run in one Lua script.
//! The marker is set last, so a write that fails never consumes its delivery
//! id.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::redis::{self, AsyncCommands, RedisError};
use chrono::{DateTime, SecondsFormat, Utc};

use super::store::{
    Applied, ProjectUsage, QuestionActivity, QuestionUsage, StoreError, UsageStore,
};
use crate::domain::DeliveryId;

pub const DEFAULT_KEY_PREFIX: &str = "courier:usage";
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// KEYS[1] row, KEYS[2] delivery marker
// ARGV: dedup flag, ttl secs, counter field, last-at field, timestamp
// returns 0 = duplicate, 1 = inserted, 2 = updated
const UPSERT_LUA: &str = r#"
if ARGV[1] == '1' and redis.call('EXISTS', KEYS[2]) == 1 then
  return 0
end
local existed = redis.call('EXISTS', KEYS[1])
redis.call('HINCRBY', KEYS[1], ARGV[3], 1)
redis.call('HSET', KEYS[1], ARGV[4], ARGV[5], 'updated_at', ARGV[5])
if existed == 0 then
  redis.call('HSET', KEYS[1], 'created_at', ARGV[5])
end
if ARGV[1] == '1' then
  redis.call('SET', KEYS[2], '1', 'EX', ARGV[2])
end
return existed + 1
"#;

pub struct RedisUsageStore {
    pool: Pool<RedisConnectionManager>,
    key_prefix: String,
    dedup_ttl: Duration,
}

impl RedisUsageStore {
    pub fn new(pool: Pool<RedisConnectionManager>) -> Self {
        Self {
            pool,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            dedup_ttl: DEFAULT_DEDUP_TTL,
        }
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// How long an applied delivery id is remembered. Redeliveries later
    /// than this are counted again.
    pub fn with_dedup_ttl(mut self, dedup_ttl: Duration) -> Self {
        self.dedup_ttl = dedup_ttl;
        self
    }

    pub async fn question_usage(
        &self,
        user_id: u64,
        question_id: u64,
    ) -> Result<Option<QuestionUsage>, StoreError> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> =
            conn.hgetall(self.question_key(user_id, question_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        parse_question_usage(user_id, question_id, &fields).map(Some)
    }

    pub async fn project_usage(
        &self,
        user_id: u64,
        project_id: u64,
    ) -> Result<Option<ProjectUsage>, StoreError> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> =
            conn.hgetall(self.project_key(user_id, project_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        parse_project_usage(user_id, project_id, &fields).map(Some)
    }

    fn question_key(&self, user_id: u64, question_id: u64) -> String {
        format!("{}:question:{user_id}:{question_id}", self.key_prefix)
    }

    fn project_key(&self, user_id: u64, project_id: u64) -> String {
        format!("{}:project:{user_id}:{project_id}", self.key_prefix)
    }

    fn delivery_key(&self, delivery_id: DeliveryId) -> String {
        format!("{}:delivery:{}", self.key_prefix, delivery_id.as_ulid())
    }

    async fn conn(&self) -> Result<PooledConnection<'_, RedisConnectionManager>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to get redis connection: {e}")))
    }

    async fn upsert(
        &self,
        row_key: String,
        delivery: Option<DeliveryId>,
        counter_field: &str,
        last_at_field: &str,
        at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        let delivery_key = delivery.map(|id| self.delivery_key(id));
        let dedup_flag = if delivery_key.is_some() { "1" } else { "0" };

        let mut conn = self.conn().await?;
        let code: i64 = redis::cmd("EVAL")
            .arg(UPSERT_LUA)
            .arg(2)
            .arg(&row_key)
            .arg(delivery_key.as_deref().unwrap_or(&row_key))
            .arg(dedup_flag)
            .arg(self.dedup_ttl.as_secs().max(1))
            .arg(counter_field)
            .arg(last_at_field)
            .arg(format_timestamp(at))
            .query_async(&mut *conn)
            .await?;
        applied_from_code(code)
    }
}

#[async_trait]
impl UsageStore for RedisUsageStore {
    async fn record_question_activity(
        &self,
        delivery: Option<DeliveryId>,
        activity: QuestionActivity,
        user_id: u64,
        question_id: u64,
        at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        self.upsert(
            self.question_key(user_id, question_id),
            delivery,
            activity.counter_field(),
            activity.last_at_field(),
            at,
        )
        .await
    }

    async fn record_project_usage(
        &self,
        delivery: Option<DeliveryId>,
        user_id: u64,
        project_id: u64,
        at: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        self.upsert(
            self.project_key(user_id, project_id),
            delivery,
            "usage_count",
            "last_used_at",
            at,
        )
        .await
    }
}

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Query(err.to_string())
        }
    }
}

fn applied_from_code(code: i64) -> Result<Applied, StoreError> {
    match code {
        0 => Ok(Applied::Duplicate),
        1 => Ok(Applied::Inserted),
        2 => Ok(Applied::Updated),
        other => Err(StoreError::Query(format!("unexpected upsert result {other}"))),
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_question_usage(
    user_id: u64,
    question_id: u64,
    fields: &HashMap<String, String>,
) -> Result<QuestionUsage, StoreError> {
    Ok(QuestionUsage {
        user_id,
        question_id,
        study_count: counter(fields, "study_count")?,
        practice_count: counter(fields, "practice_count")?,
        last_studied_at: timestamp(fields, "last_studied_at")?,
        last_practiced_at: timestamp(fields, "last_practiced_at")?,
        created_at: required_timestamp(fields, "created_at")?,
        updated_at: required_timestamp(fields, "updated_at")?,
    })
}

fn parse_project_usage(
    user_id: u64,
    project_id: u64,
    fields: &HashMap<String, String>,
) -> Result<ProjectUsage, StoreError> {
    Ok(ProjectUsage {
        user_id,
        project_id,
        usage_count: counter(fields, "usage_count")?,
        last_used_at: required_timestamp(fields, "last_used_at")?,
        created_at: required_timestamp(fields, "created_at")?,
        updated_at: required_timestamp(fields, "updated_at")?,
    })
}

fn counter(fields: &HashMap<String, String>, name: &str) -> Result<u64, StoreError> {
    match fields.get(name) {
        None => Ok(0),
        Some(raw) => raw
            .parse()
            .map_err(|e| StoreError::Query(format!("field {name}={raw:?}: {e}"))),
    }
}

fn timestamp(
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let Some(raw) = fields.get(name) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|at| Some(at.with_timezone(&Utc)))
        .map_err(|e| StoreError::Query(format!("field {name}={raw:?}: {e}")))
}

fn required_timestamp(
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<DateTime<Utc>, StoreError> {
    timestamp(fields, name)?.ok_or_else(|| StoreError::Query(format!("missing field {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb8_redis::redis::ErrorKind;
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn key_layout() {
        let manager = RedisConnectionManager::new("redis://127.0.0.1:6379").unwrap();
        let store = RedisUsageStore::new(Pool::builder().build_unchecked(manager))
            .with_key_prefix("app:usage");
        let id = DeliveryId::from_ulid(Ulid::from_parts(1, 2));

        assert_eq!(store.question_key(7, 42), "app:usage:question:7:42");
        assert_eq!(store.project_key(7, 3), "app:usage:project:7:3");
        assert_eq!(
            store.delivery_key(id),
            format!("app:usage:delivery:{}", Ulid::from_parts(1, 2))
        );
    }

    #[rstest]
    #[case(0, Applied::Duplicate)]
    #[case(1, Applied::Inserted)]
    #[case(2, Applied::Updated)]
    fn script_results(#[case] code: i64, #[case] expected: Applied) {
        assert_eq!(applied_from_code(code).unwrap(), expected);
    }

    #[test]
    fn unknown_script_result_is_a_query_error() {
        assert!(matches!(applied_from_code(9), Err(StoreError::Query(_))));
    }

    #[test]
    fn parses_question_row_written_by_the_script() {
        let studied = Utc.with_ymd_and_hms(2024, 8, 1, 10, 0, 0).unwrap();
        let ts = format_timestamp(studied);
        let raw = fields(&[
            ("study_count", "3"),
            ("last_studied_at", ts.as_str()),
            ("created_at", ts.as_str()),
            ("updated_at", ts.as_str()),
        ]);

        let row = parse_question_usage(7, 42, &raw).unwrap();

        assert_eq!(row.study_count, 3);
        assert_eq!(row.practice_count, 0);
        assert_eq!(row.last_studied_at, Some(studied));
        assert_eq!(row.last_practiced_at, None);
        assert_eq!(row.created_at, studied);
    }

    #[test]
    fn parses_project_row() {
        let at = Utc.with_ymd_and_hms(2024, 8, 2, 0, 0, 0).unwrap();
        let ts = format_timestamp(at);
        let raw = fields(&[
            ("usage_count", "12"),
            ("last_used_at", ts.as_str()),
            ("created_at", ts.as_str()),
            ("updated_at", ts.as_str()),
        ]);

        let row = parse_project_usage(1, 9, &raw).unwrap();
        assert_eq!(row.usage_count, 12);
        assert_eq!(row.last_used_at, at);
    }

    #[rstest]
    #[case::bad_counter(&[("study_count", "many"), ("created_at", "2024-08-01T00:00:00Z"), ("updated_at", "2024-08-01T00:00:00Z")])]
    #[case::bad_timestamp(&[("created_at", "yesterday"), ("updated_at", "2024-08-01T00:00:00Z")])]
    #[case::missing_created_at(&[("updated_at", "2024-08-01T00:00:00Z")])]
    fn corrupt_rows_are_query_errors(#[case] pairs: &[(&str, &str)]) {
        let result = parse_question_usage(1, 1, &fields(pairs));
        assert!(matches!(result, Err(StoreError::Query(_))));
    }

    #[test]
    fn connection_errors_are_unavailable() {
        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(StoreError::from(io), StoreError::Unavailable(_)));

        let script = RedisError::from((ErrorKind::ResponseError, "ERR bad script"));
        assert!(matches!(StoreError::from(script), StoreError::Query(_)));
    }
}
