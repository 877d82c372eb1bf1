//! Durable, time-ordered request queue.
//!
//! The queue is a plain ordered key-value table: one record per pending
//! entry, keyed by [`key::encode`]. There are no secondary indices. Ordering
//! by key is the only selection mechanism, so [`RequestStore::next`]
//! always yields the earliest-due entries first.
//!
//! # Example
//!
//! ```
//! use courier_core::{enqueue, RedbRequestStore, RequestStore, TestClock};
//!
//! let store = RedbRequestStore::open_in_memory().unwrap();
//! let clock = TestClock::new();
//!
//! let entry = enqueue(&store, &clock, "GET", "/status", 3).unwrap();
//! assert_eq!(store.next(10).unwrap(), vec![entry]);
//! ```

pub mod key;
mod redb_store;

pub use redb_store::RedbRequestStore;
use tracing::debug;

use crate::{
    error::Result,
    models::{EntryId, QueueEntry},
    time::Clock,
};

/// Storage operations required by the relay pipeline.
///
/// Implementations own their concurrency discipline: each call runs in its
/// own read or read-write transaction and nothing is held open between
/// calls. Operations are expected to be fast and local.
pub trait RequestStore: Send + Sync + 'static {
    /// Upserts the entry at its derived key.
    fn put(&self, entry: &QueueEntry) -> Result<()>;

    /// Returns up to `n` entries in ascending `(delivery_time, id)` order.
    ///
    /// An empty queue yields an empty vector, never an error.
    fn next(&self, n: usize) -> Result<Vec<QueueEntry>>;

    /// Atomically removes `old`'s key and inserts `new`.
    ///
    /// Either both halves are committed or neither is.
    fn reschedule(&self, old: &QueueEntry, new: &QueueEntry) -> Result<()>;

    /// Removes the entry's key. Deleting a missing key is not an error.
    fn delete(&self, entry: &QueueEntry) -> Result<()>;

    /// Number of stored entries.
    fn len(&self) -> Result<usize>;

    /// Returns `true` if the queue holds no entries.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Verifies the store can serve reads.
    fn health_check(&self) -> Result<()> {
        self.len().map(|_| ())
    }
}

/// Creates and persists a fresh entry for an inbound request.
///
/// The entry is due immediately (`delivery_time` = now) and unscheduled.
/// Returns once the entry is durably stored; delivery happens later.
///
/// # Errors
///
/// Returns the store's error if the entry cannot be persisted.
pub fn enqueue(
    store: &dyn RequestStore,
    clock: &dyn Clock,
    method: &str,
    target_path: &str,
    ttl: u32,
) -> Result<QueueEntry> {
    let entry = QueueEntry::new(EntryId::new(), clock.now_nanos(), method, target_path, ttl);
    store.put(&entry)?;
    debug!(entry_id = %entry.id, method, target_path, ttl, "entry enqueued");
    Ok(entry)
}
