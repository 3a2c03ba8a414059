//! WorkerManager - starts and stops a fleet of workers as one unit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::worker::ManagedWorker;
use crate::error::WorkerError;

/// Registry of named workers.
///
/// Design:
/// - Populated during startup (`register_worker`), then `start_all` once,
///   then `stop_all` once at shutdown.
/// - An owned value, not a global: whatever bootstraps the process builds
///   one and keeps it.
#[derive(Default)]
pub struct WorkerManager {
    workers: HashMap<String, Arc<dyn ManagedWorker>>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
        }
    }

    /// Register a worker under a unique name.
    ///
    /// A duplicate name is a configuration error; the first registration is
    /// kept.
    pub fn register_worker<W>(
        &mut self,
        name: impl Into<String>,
        worker: W,
    ) -> Result<(), WorkerError>
    where
        W: ManagedWorker + 'static,
    {
        let name = name.into();
        if self.workers.contains_key(&name) {
            return Err(WorkerError::AlreadyRegistered(name));
        }
        self.workers.insert(name, Arc::new(worker));
        Ok(())
    }

    /// Start every registered worker under the same parent token.
    ///
    /// Every worker is attempted. Only misuse (starting a worker twice) can
    /// fail, and those failures are reported together.
    pub fn start_all(&self, parent: &CancellationToken) -> Result<(), WorkerError> {
        let mut failures = Vec::new();
        for (name, worker) in &self.workers {
            match worker.start(parent) {
                Ok(()) => info!(action = "worker_start", name = %name, "started worker"),
                Err(e) => {
                    error!(
                        action = "worker_start_failed",
                        name = %name,
                        error = %e,
                        "failed to start worker"
                    );
                    failures.push((name.clone(), e));
                }
            }
        }

        if !failures.is_empty() {
            failures.sort_by(|a, b| a.0.cmp(&b.0));
            return Err(WorkerError::StartFailed(failures));
        }

        info!(
            action = "workers_started",
            count = self.workers.len(),
            "all workers started"
        );
        Ok(())
    }

    /// Stop every worker concurrently, each bounded by `timeout`.
    ///
    /// One worker failing to stop does not prevent stopping the others; all
    /// failures are collected into a single [`WorkerError::StopFailed`].
    pub async fn stop_all(&self, timeout: Duration) -> Result<(), WorkerError> {
        let mut stops = JoinSet::new();
        for (name, worker) in &self.workers {
            let name = name.clone();
            let worker = Arc::clone(worker);
            stops.spawn(async move {
                let result = worker.stop(timeout).await;
                (name, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(e))) => failures.push((name, e)),
                Err(join_err) => failures.push((
                    "<unknown>".to_string(),
                    WorkerError::Crashed {
                        worker: "<unknown>".to_string(),
                        reason: join_err.to_string(),
                    },
                )),
            }
        }

        if !failures.is_empty() {
            failures.sort_by(|a, b| a.0.cmp(&b.0));
            let err = WorkerError::StopFailed(failures);
            error!(
                action = "workers_stop_failed",
                error = %err,
                "some workers did not stop"
            );
            return Err(err);
        }

        info!(
            action = "workers_stopped",
            count = self.workers.len(),
            "all workers stopped successfully"
        );
        Ok(())
    }

    pub fn get_worker(&self, name: &str) -> Option<Arc<dyn ManagedWorker>> {
        self.workers.get(name).cloned()
    }

    pub fn count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.keys().cloned().collect();
        names.sort();
        names
    }
}
