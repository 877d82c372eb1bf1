//! Queue entry model and strongly-typed identifiers.
//!
//! A `QueueEntry` is one pending relay of an inbound request. Its position
//! in the queue is derived entirely from `(delivery_time, id)`, which is
//! why both fields are part of the storage key (see
//! [`crate::storage::key`]).

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::storage::key::{self, StorageKey};

/// Strongly-typed entry identifier.
///
/// Eight opaque bytes assigned at creation. The identifier follows an entry
/// through every reschedule and is only used for key uniqueness and logging.
///
/// # Example
///
/// ```
/// use courier_core::EntryId;
///
/// let id: EntryId = "00000000000000ff".parse().unwrap();
/// assert_eq!(id.to_string(), "00000000000000ff");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    /// Creates a new random entry ID.
    pub fn new() -> Self {
        Self(rand::random())
    }

    /// Big-endian byte representation, as used in the storage key suffix.
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for EntryId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for EntryId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(Self)
    }
}

/// One unit of pending relay work.
///
/// `target_path` and `method` are immutable after creation. `delivery_time`
/// only changes through a reschedule, which replaces the stored record with
/// a new one under a new key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique identifier, stable across reschedules.
    pub id: EntryId,
    /// Earliest dispatch instant, nanoseconds since the Unix epoch.
    pub delivery_time: i64,
    /// Path (and query) appended to the downstream base URL.
    pub target_path: String,
    /// HTTP method of the relayed request.
    pub method: String,
    /// Claimed by the scheduler and handed to a worker; never re-claimed
    /// while set.
    pub scheduled: bool,
    /// Remaining retry budget.
    pub ttl: u32,
}

impl QueueEntry {
    /// Creates an unscheduled entry.
    pub fn new(
        id: EntryId,
        delivery_time: i64,
        method: impl Into<String>,
        target_path: impl Into<String>,
        ttl: u32,
    ) -> Self {
        Self {
            id,
            delivery_time,
            target_path: target_path.into(),
            method: method.into(),
            scheduled: false,
            ttl,
        }
    }

    /// Storage key of this entry: `be(delivery_time) || be(id)`.
    pub fn storage_key(&self) -> StorageKey {
        key::encode(self.delivery_time, self.id)
    }

    /// Whether the entry may be dispatched at `now_nanos`.
    pub const fn is_due(&self, now_nanos: i64) -> bool {
        self.delivery_time <= now_nanos
    }

    /// Copy of this entry marked as claimed.
    pub fn claimed(&self) -> Self {
        Self { scheduled: true, ..self.clone() }
    }

    /// Copy of this entry with the claim cleared.
    pub fn released(&self) -> Self {
        Self { scheduled: false, ..self.clone() }
    }
}

impl fmt::Display for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} (delivery_time={}, ttl={}, scheduled={})",
            self.id, self.method, self.target_path, self.delivery_time, self.ttl, self.scheduled
        )
    }
}
