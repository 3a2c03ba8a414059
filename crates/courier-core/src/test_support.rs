//! Test doubles shared by the worker and manager tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::Task;
use crate::impls::InMemoryQueueProvider;
use crate::ports::{ProcessError, QueueError, QueueProvider, TaskProcessor};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeqTask {
    #[serde(rename = "type")]
    pub task_type: String,
    pub seq: u32,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl SeqTask {
    pub fn new(seq: u32) -> Self {
        Self {
            task_type: "study".to_string(),
            seq,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}

impl Task for SeqTask {
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
        self.created_at
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Script {
    AlwaysOk,
    /// Fail while `retry_count < n`.
    FailTimes(u32),
    AlwaysFail,
    /// Take this long, ignoring cancellation.
    Slow(Duration),
    /// Never finish.
    Hang,
}

#[derive(Debug, Clone, Copy)]
pub struct Call {
    pub seq: u32,
    pub retry_count: u32,
    pub at: Instant,
}

pub struct ScriptedProcessor {
    script: Script,
    calls: Mutex<Vec<Call>>,
    entered: AtomicBool,
}

impl ScriptedProcessor {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
            entered: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn seqs(&self) -> Vec<u32> {
        self.calls().iter().map(|c| c.seq).collect()
    }

    pub fn retry_counts(&self) -> Vec<u32> {
        self.calls().iter().map(|c| c.retry_count).collect()
    }

    pub fn has_entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskProcessor for ScriptedProcessor {
    type Task = SeqTask;

    async fn process_task(
        &self,
        _cancel: &CancellationToken,
        task: &SeqTask,
    ) -> Result<(), ProcessError> {
        self.entered.store(true, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            seq: task.seq,
            retry_count: task.retry_count,
            at: Instant::now(),
        });

        match self.script {
            Script::AlwaysOk => Ok(()),
            Script::FailTimes(n) if task.retry_count < n => {
                Err(ProcessError::Other(format!("scripted failure {}", task.retry_count)))
            }
            Script::FailTimes(_) => Ok(()),
            Script::AlwaysFail => Err(ProcessError::Other("always fails".to_string())),
            Script::Slow(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            Script::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    fn supported_types(&self) -> Vec<&'static str> {
        vec!["study"]
    }
}

/// In-memory queue whose `push` and `pop` can be switched to fail.
#[derive(Default)]
pub struct FlakyQueue {
    pub inner: InMemoryQueueProvider,
    fail_push: AtomicBool,
    fail_pop: AtomicBool,
    failed_pops: AtomicUsize,
}

impl FlakyQueue {
    pub fn fail_pushes(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    pub fn fail_pops(&self, fail: bool) {
        self.fail_pop.store(fail, Ordering::SeqCst);
    }

    pub fn failed_pops(&self) -> usize {
        self.failed_pops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueProvider for FlakyQueue {
    async fn push(&self, queue_key: &str, task_data: &str) -> Result<(), QueueError> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("push disabled".to_string()));
        }
        self.inner.push(queue_key, task_data).await
    }

    async fn pop(&self, queue_key: &str) -> Result<Option<String>, QueueError> {
        if self.fail_pop.load(Ordering::SeqCst) {
            self.failed_pops.fetch_add(1, Ordering::SeqCst);
            return Err(QueueError::Unavailable("pop disabled".to_string()));
        }
        self.inner.pop(queue_key).await
    }

    async fn length(&self, queue_key: &str) -> Result<i64, QueueError> {
        self.inner.length(queue_key).await
    }
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
