//! Business adapters that plug into workers as [`TaskProcessor`](crate::ports::TaskProcessor)s.
//!
//! - **question**: syncs question study/practice counters and project usage
//!   counters from the API's hot path into the usage store

pub mod question;

pub use self::question::{
    InMemoryUsageStore, QUESTION_SYNC_QUEUE, QuestionTask, QuestionTaskProcessor,
    QuestionTaskProducer, RedisUsageStore, UsageStore,
};
