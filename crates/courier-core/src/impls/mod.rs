//! Impls - concrete queue backends.
//!
//! - [`InMemoryQueueProvider`]: process-local lists, for tests and demo runs
//! - [`RedisQueueProvider`]: Redis lists (`LPUSH` / `RPOP` / `LLEN`) over a bb8 pool

pub mod memory_queue;
pub mod redis_queue;

pub use self::memory_queue::InMemoryQueueProvider;
pub use self::redis_queue::{RedisPoolConfig, RedisQueueProvider};
