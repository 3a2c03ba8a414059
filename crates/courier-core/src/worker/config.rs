//! Per-worker configuration.

use std::time::Duration;

use crate::error::WorkerError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Human-readable name used in logs.
    pub worker_name: String,

    /// Queue this worker drains.
    pub queue_key: String,

    /// Time between drains.
    pub poll_interval: Duration,

    /// Failed attempts allowed before a task is discarded. A task is processed
    /// at most `max_retries + 1` times.
    pub max_retries: u32,
}

impl WorkerConfig {
    pub fn new(worker_name: impl Into<String>, queue_key: impl Into<String>) -> Self {
        Self {
            worker_name: worker_name.into(),
            queue_key: queue_key.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.worker_name.trim().is_empty() {
            return Err(WorkerError::InvalidConfig("worker_name must not be empty".into()));
        }
        if self.queue_key.trim().is_empty() {
            return Err(WorkerError::InvalidConfig(format!(
                "queue_key must not be empty (worker '{}')",
                self.worker_name
            )));
        }
        // tokio intervals cannot have a zero period
        if self.poll_interval.is_zero() {
            return Err(WorkerError::InvalidConfig(format!(
                "poll_interval must be > 0 (worker '{}')",
                self.worker_name
            )));
        }
        Ok(())
    }
}
