//! Worker lifecycle state machine.

use std::fmt;

/// Lifecycle of a [`Worker`](super::Worker).
///
/// State transitions:
/// - Created -> Running (`start`)
/// - Running -> Stopping (`stop` requested)
/// - Stopping -> Stopped (poll loop exited within the timeout)
/// - Stopping stays Stopping when the timeout elapses first; `stop` may be
///   called again to keep waiting
///
/// There is no way back to Running: a stopped worker is not restartable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Created => "created",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
