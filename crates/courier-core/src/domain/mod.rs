//! Domain model: the task contract every queued payload implements.

pub mod ids;
pub mod task;

pub use self::ids::DeliveryId;
pub use self::task::Task;
