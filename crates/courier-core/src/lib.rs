//! Core data model and durable queue for the courier relay.
//!
//! Provides the queue entry type, the ordered key encoding that makes a
//! plain key-value scan behave like a time-ordered work queue, the
//! `RequestStore` abstraction with its redb implementation, and the clock
//! used by every component that reads time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{Result, StorageError};
pub use models::{EntryId, QueueEntry};
pub use storage::{enqueue, RedbRequestStore, RequestStore};
pub use time::{Clock, RealClock, TestClock};

/// Retry budget given to entries created by the ingress adapter.
pub const DEFAULT_TTL: u32 = 3;
