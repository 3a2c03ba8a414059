//! Worker module: polling loop, retry policies, lifecycle, and the fleet manager.

mod config;
mod manager;
mod retry;
mod state;
#[allow(clippy::module_inception)]
mod worker;


pub use config::{DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL, WorkerConfig};
pub use manager::WorkerManager;
pub use retry::{ExponentialBackoff, ImmediateRequeue, RetryPolicy};
pub use state::WorkerState;
pub use worker::{ManagedWorker, Worker};
