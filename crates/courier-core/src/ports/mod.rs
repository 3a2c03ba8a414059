//! Ports - seams between the worker framework and its collaborators.
//!
//! Business modules supply a [`TaskProcessor`]; deployments supply a
//! [`QueueProvider`] backend. The worker only ever talks to these traits.

pub mod clock;
pub mod processor;
pub mod queue;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::processor::{ProcessError, TaskProcessor};
pub use self::queue::{QueueError, QueueProvider};
