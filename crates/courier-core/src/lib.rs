//! courier-core
//!
//! Building blocks for deferred, at-least-once background work.
//!
//! # Modules
//! - **domain**: task contract and delivery ids
//! - **ports**: abstractions over the outside world (TaskProcessor, QueueProvider, Clock)
//! - **impls**: queue backends (in-memory, Redis lists)
//! - **worker**: polling worker, retry policies, and the WorkerManager fleet
//! - **processors**: business adapters (question usage sync) and their producers
//! - **producer**: generic enqueue helper for API-side code
//! - **error**: framework errors surfaced to callers
//!
//! # Flow
//! A producer serializes a [`Task`] and calls [`QueueProvider::push`]. A
//! [`Worker`] polls its queue key on an interval, drains it on every tick and
//! hands each task to its [`TaskProcessor`]. Failed tasks are re-pushed to the
//! back of the same queue until `max_retries` is spent, then discarded.

pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod processors;
pub mod producer;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use self::domain::{DeliveryId, Task};
pub use self::error::WorkerError;
pub use self::impls::{InMemoryQueueProvider, RedisPoolConfig, RedisQueueProvider};
pub use self::producer::{EnqueueError, enqueue};
pub use self::ports::{
    Clock, FixedClock, ProcessError, QueueError, QueueProvider, SystemClock, TaskProcessor,
};
pub use self::worker::{
    ExponentialBackoff, ImmediateRequeue, ManagedWorker, RetryPolicy, Worker, WorkerConfig,
    WorkerManager, WorkerState,
};
