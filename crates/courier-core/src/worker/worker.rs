//! Worker - one queue key, one processor, one background poll loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::config::WorkerConfig;
use super::retry::{ImmediateRequeue, RetryPolicy};
use super::state::WorkerState;
use crate::domain::Task;
use crate::error::WorkerError;
use crate::ports::{ProcessError, QueueError, QueueProvider, TaskProcessor};

/// Lifecycle operations shared by every worker, whatever its processor type.
///
/// [`WorkerManager`](super::WorkerManager) stores workers as
/// `Arc<dyn ManagedWorker>`.
#[async_trait]
pub trait ManagedWorker: Send + Sync {
    fn worker_name(&self) -> &str;

    fn state(&self) -> WorkerState;

    /// Spawn the poll loop under a child of `parent` and return immediately.
    /// Must be called from within a tokio runtime.
    fn start(&self, parent: &CancellationToken) -> Result<(), WorkerError>;

    /// Cancel the poll loop and wait up to `timeout` for it to exit.
    ///
    /// An in-flight task always runs to completion, so the loop may outlive
    /// the timeout. It is not killed: the worker stays `Stopping` and a later
    /// call can wait again.
    async fn stop(&self, timeout: Duration) -> Result<(), WorkerError>;

    /// Items currently waiting in this worker's queue.
    async fn pending(&self) -> Result<i64, QueueError>;
}

/// Polls one queue key and feeds every task to a [`TaskProcessor`].
///
/// # Example
/// ```ignore
/// let config = WorkerConfig::new("question-sync-worker", "sync:question:usage");
/// let worker = Worker::new(config, Arc::new(processor), queue)?;
/// worker.start(&shutdown)?;
/// // ...
/// worker.stop(Duration::from_secs(10)).await?;
/// ```
///
/// Tasks are processed one at a time on a single background task. Scale out
/// by registering more workers with distinct queue keys.
pub struct Worker<P: TaskProcessor> {
    config: WorkerConfig,
    processor: Arc<P>,
    queue: Arc<dyn QueueProvider>,
    retry_policy: Arc<dyn RetryPolicy>,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    state: WorkerState,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl<P: TaskProcessor> Worker<P> {
    pub fn new(
        config: WorkerConfig,
        processor: Arc<P>,
        queue: Arc<dyn QueueProvider>,
    ) -> Result<Self, WorkerError> {
        config.validate()?;
        Ok(Self {
            config,
            processor,
            queue,
            retry_policy: Arc::new(ImmediateRequeue),
            lifecycle: Mutex::new(Lifecycle {
                state: WorkerState::Created,
                cancel: None,
                handle: None,
            }),
        })
    }

    /// Replace the default [`ImmediateRequeue`] policy.
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }
}

fn lock(lifecycle: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A poll-loop handle borrowed out of [`Lifecycle`] while `stop` waits on it.
///
/// Unless the loop was joined, the handle goes back on drop, so a timed-out
/// or abandoned `stop` leaves the worker stoppable.
struct PendingJoin<'a> {
    lifecycle: &'a Mutex<Lifecycle>,
    handle: Option<JoinHandle<()>>,
}

impl PendingJoin<'_> {
    async fn join(&mut self) -> Result<(), JoinError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        let joined = handle.await;
        self.handle = None;
        joined
    }
}

impl Drop for PendingJoin<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            lock(self.lifecycle).handle = Some(handle);
        }
    }
}

#[async_trait]
impl<P: TaskProcessor> ManagedWorker for Worker<P> {
    fn worker_name(&self) -> &str {
        &self.config.worker_name
    }

    fn state(&self) -> WorkerState {
        self.lifecycle().state
    }

    fn start(&self, parent: &CancellationToken) -> Result<(), WorkerError> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != WorkerState::Created {
            return Err(WorkerError::AlreadyStarted(self.config.worker_name.clone()));
        }

        let cancel = parent.child_token();
        let poll_loop = PollLoop {
            config: self.config.clone(),
            processor: Arc::clone(&self.processor),
            queue: Arc::clone(&self.queue),
            retry_policy: Arc::clone(&self.retry_policy),
        };
        let handle = tokio::spawn(poll_loop.run(cancel.clone()));

        lifecycle.state = WorkerState::Running;
        lifecycle.cancel = Some(cancel);
        lifecycle.handle = Some(handle);

        info!(
            action = "worker_started",
            worker_name = %self.config.worker_name,
            queue_key = %self.config.queue_key,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_retries = self.config.max_retries,
            supported_types = ?self.processor.supported_types(),
            "worker started"
        );
        Ok(())
    }

    async fn stop(&self, timeout: Duration) -> Result<(), WorkerError> {
        let (cancel, handle) = {
            let mut lifecycle = self.lifecycle();
            match lifecycle.state {
                WorkerState::Created | WorkerState::Stopped => return Ok(()),
                WorkerState::Running | WorkerState::Stopping => {
                    lifecycle.state = WorkerState::Stopping;
                    (lifecycle.cancel.clone(), lifecycle.handle.take())
                }
            }
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        let Some(handle) = handle else {
            return Err(WorkerError::StopInProgress(self.config.worker_name.clone()));
        };
        let mut pending = PendingJoin {
            lifecycle: &self.lifecycle,
            handle: Some(handle),
        };

        match tokio::time::timeout(timeout, pending.join()).await {
            Ok(joined) => {
                self.lifecycle().state = WorkerState::Stopped;
                match joined {
                    Ok(()) => {
                        info!(
                            action = "worker_stopped",
                            worker_name = %self.config.worker_name,
                            "worker stopped gracefully"
                        );
                        Ok(())
                    }
                    Err(join_err) => {
                        error!(
                            action = "worker_crashed",
                            worker_name = %self.config.worker_name,
                            error = %join_err,
                            "poll loop ended abnormally"
                        );
                        Err(WorkerError::Crashed {
                            worker: self.config.worker_name.clone(),
                            reason: join_err.to_string(),
                        })
                    }
                }
            }
            Err(_elapsed) => {
                drop(pending);
                warn!(
                    action = "worker_stop_timeout",
                    worker_name = %self.config.worker_name,
                    timeout_ms = timeout.as_millis() as u64,
                    "worker did not stop in time; poll loop left running"
                );
                Err(WorkerError::StopTimeout {
                    worker: self.config.worker_name.clone(),
                    timeout,
                })
            }
        }
    }

    async fn pending(&self) -> Result<i64, QueueError> {
        self.queue.length(&self.config.queue_key).await
    }
}

/// State owned by the spawned background task.
struct PollLoop<P: TaskProcessor> {
    config: WorkerConfig,
    processor: Arc<P>,
    queue: Arc<dyn QueueProvider>,
    retry_policy: Arc<dyn RetryPolicy>,
}

impl<P: TaskProcessor> PollLoop<P> {
    async fn run(self, cancel: CancellationToken) {
        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(
                        action = "worker_shutdown_signal",
                        worker_name = %self.config.worker_name,
                        "worker received shutdown signal"
                    );
                    return;
                }
                _ = ticker.tick() => self.drain(&cancel).await,
            }
        }
    }

    /// Pop and process until the queue is empty or shutdown is requested.
    async fn drain(&self, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            let raw = match self.queue.pop(&self.config.queue_key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => return,
                Err(e) => {
                    // next tick tries again
                    warn!(
                        action = "pop_task_failed",
                        worker_name = %self.config.worker_name,
                        queue_key = %self.config.queue_key,
                        error = %e,
                        "failed to pop from queue"
                    );
                    return;
                }
            };
            self.handle_raw(cancel, raw).await;
        }
    }

    async fn handle_raw(&self, cancel: &CancellationToken, raw: String) {
        // a malformed payload would fail the same way on every retry
        let mut task = match self.processor.unmarshal(raw.as_bytes()) {
            Ok(task) => task,
            Err(e) => {
                error!(
                    action = "unmarshal_task_failed",
                    worker_name = %self.config.worker_name,
                    error = %e,
                    task_data = %raw,
                    "discarding malformed task"
                );
                return;
            }
        };

        match self.processor.process_task(cancel, &task).await {
            Ok(()) => info!(
                action = "task_processed_successfully",
                worker_name = %self.config.worker_name,
                task_type = task.task_type(),
                retry_count = task.retry_count(),
                "task processed"
            ),
            Err(e) => self.handle_failure(cancel, &mut task, &raw, e).await,
        }
    }

    async fn handle_failure(
        &self,
        cancel: &CancellationToken,
        task: &mut P::Task,
        raw: &str,
        err: ProcessError,
    ) {
        let retry_count = task.retry_count();

        if retry_count >= self.config.max_retries {
            error!(
                action = "task_failed_final",
                worker_name = %self.config.worker_name,
                task_type = task.task_type(),
                retry_count,
                error = %err,
                task_data = %raw,
                "task discarded after exhausting retries"
            );
            return;
        }

        let delay = self.retry_policy.delay_for(retry_count);
        if !delay.is_zero() {
            // on shutdown, push right away rather than lose the task
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        task.increment_retry();
        let retry_data = match task.marshal().map(String::from_utf8) {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                self.log_marshal_failure(task, &e);
                return;
            }
            Err(e) => {
                self.log_marshal_failure(task, &e);
                return;
            }
        };

        if let Err(push_err) = self.queue.push(&self.config.queue_key, &retry_data).await {
            error!(
                action = "push_retry_task_failed",
                worker_name = %self.config.worker_name,
                task_type = task.task_type(),
                error = %push_err,
                task_data = %retry_data,
                "retry lost: could not re-push task"
            );
            return;
        }

        warn!(
            action = "task_retry_pushed",
            worker_name = %self.config.worker_name,
            task_type = task.task_type(),
            retry_count = retry_count + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "task failed; re-queued for retry"
        );
    }

    fn log_marshal_failure(&self, task: &P::Task, err: &dyn std::error::Error) {
        error!(
            action = "marshal_retry_task_failed",
            worker_name = %self.config.worker_name,
            task_type = task.task_type(),
            error = %err,
            "retry lost: could not serialize task"
        );
    }
}
