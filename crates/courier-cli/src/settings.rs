//! JSON settings file for the `courier` binary.
//!
//! Every field has a default, so an empty object (or no file at all) yields
//! the single question-sync worker.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use courier_core::processors::QUESTION_SYNC_QUEUE;
use courier_core::processors::question::DEFAULT_DEDUP_TTL;
use courier_core::worker::{DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL};
use courier_core::{ExponentialBackoff, RedisPoolConfig, WorkerConfig};
use serde::Deserialize;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub redis_url: String,
    pub redis: RedisSettings,
    /// How long the usage store remembers an applied delivery id.
    pub usage_dedup_ttl_secs: u64,
    pub shutdown_timeout_ms: u64,
    pub workers: Vec<WorkerSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            redis: RedisSettings::default(),
            usage_dedup_ttl_secs: DEFAULT_DEDUP_TTL.as_secs(),
            shutdown_timeout_ms: 30_000,
            workers: vec![WorkerSettings::default()],
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read settings file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parse settings file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let settings: Settings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn usage_dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.usage_dedup_ttl_secs)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.workers.is_empty() {
            anyhow::bail!("at least one worker must be configured");
        }
        if self.usage_dedup_ttl_secs == 0 {
            anyhow::bail!("usage_dedup_ttl_secs must be > 0");
        }
        for worker in &self.workers {
            worker
                .worker_config()
                .validate()
                .with_context(|| format!("worker '{}'", worker.name))?;
        }
        self.redis.pool_config().validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisSettings {
    pub max_size: u32,
    pub min_idle: u32,
    pub connection_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub max_lifetime_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        let pool = RedisPoolConfig::default();
        Self {
            max_size: pool.max_size,
            min_idle: pool.min_idle,
            connection_timeout_ms: pool.connection_timeout.as_millis() as u64,
            idle_timeout_ms: pool.idle_timeout.as_millis() as u64,
            max_lifetime_ms: pool.max_lifetime.as_millis() as u64,
        }
    }
}

impl RedisSettings {
    pub fn pool_config(&self) -> RedisPoolConfig {
        RedisPoolConfig {
            max_size: self.max_size,
            min_idle: self.min_idle,
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            max_lifetime: Duration::from_millis(self.max_lifetime_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSettings {
    /// Registration name in the manager.
    pub name: String,
    pub worker_name: String,
    pub queue_key: String,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    /// Absent means failed tasks are re-pushed immediately.
    pub backoff: Option<BackoffSettings>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            name: "question-sync".to_string(),
            worker_name: "question-sync-worker".to_string(),
            queue_key: QUESTION_SYNC_QUEUE.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: None,
        }
    }
}

impl WorkerSettings {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::new(self.worker_name.clone(), self.queue_key.clone())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_max_retries(self.max_retries)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffSettings {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        let policy = ExponentialBackoff::default();
        Self {
            base_delay_ms: policy.base_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl BackoffSettings {
    pub fn policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}
