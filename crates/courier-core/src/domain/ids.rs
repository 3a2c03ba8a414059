//! Delivery identifiers.
//!
//! A `DeliveryId` is stamped on a task once, when the producer builds it, and
//! is carried unchanged through every retry. Processors whose side effects are
//! not naturally idempotent use it as a dedup key.
//!
//! ULIDs sort by creation time and need no coordination between producers,
//! so several API processes can stamp tasks for the same queue.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(Ulid);

impl DeliveryId {
    /// New id whose timestamp part is `at`.
    pub fn new_at(at: DateTime<Utc>) -> Self {
        let timestamp_ms = at.timestamp_millis().max(0) as u64;
        Self(Ulid::from_parts(timestamp_ms, rand::random()))
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for DeliveryId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delivery-{}", self.0)
    }
}
