//! Task trait - the unit of deferred work.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A unit of work that is serialized onto a queue and processed later.
///
/// Implementations carry everything a processor needs: a type tag, the
/// payload fields for that type, a retry counter, and the creation time.
///
/// # Example
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct PingTask {
///     #[serde(rename = "type")]
///     task_type: String,
///     time: DateTime<Utc>,
///     #[serde(default)]
///     retry_count: u32,
/// }
///
/// impl Task for PingTask {
///     fn task_type(&self) -> &str { &self.task_type }
///     fn retry_count(&self) -> u32 { self.retry_count }
///     fn increment_retry(&mut self) { self.retry_count += 1 }
///     fn created_at(&self) -> DateTime<Utc> { self.time }
/// }
/// ```
///
/// # Trait bounds
/// - `Serialize` / `DeserializeOwned`: the queue stores JSON text
/// - `Send + Sync + 'static`: tasks move into the worker's background loop
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Tag selecting the handler inside a processor (e.g. "study", "usage").
    fn task_type(&self) -> &str;

    /// Number of failed attempts so far. Starts at 0.
    fn retry_count(&self) -> u32;

    /// Called exactly once per failed attempt, before the task is re-pushed.
    fn increment_retry(&mut self);

    /// Set once at construction and never mutated.
    fn created_at(&self) -> DateTime<Utc>;

    /// Serialize for queue storage.
    fn marshal(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
