//! Relay delivery pipeline: scheduler, worker pool and HTTP client.
//!
//! Entries are promoted from the durable queue by a single scheduler loop
//! and handed, one at a time, to a fixed pool of workers through a
//! rendezvous channel. Workers re-issue the stored request against the
//! downstream server and feed the outcome back into the queue.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  next(n)   ┌───────────┐  hand-off  ┌──────────────┐
//! │ RequestStore  │◀──────────▶│ Scheduler │───────────▶│ Worker pool  │
//! └───────────────┘  claim     └───────────┘  (cap. 0)  └──────────────┘
//!         ▲                                                     │
//!         └──────── delete / reschedule ────────────────────────┘
//! ```
//!
//! 1. **Scan** - the scheduler reads the earliest entries in key order
//! 2. **Claim** - a due, unscheduled entry is persisted with `scheduled=true`
//! 3. **Hand-off** - the scheduler blocks until a worker takes the entry
//! 4. **Deliver** - the worker issues `METHOD <base-url><path>`
//! 5. **Outcome** - `200` deletes; anything else reschedules or expires
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier_core::{RealClock, RedbRequestStore};
//! use courier_delivery::{DeliveryConfig, DeliveryEngine, DeliveryError};
//!
//! # async fn example() -> std::result::Result<(), DeliveryError> {
//! let store = Arc::new(RedbRequestStore::open("requests.db")?);
//! let mut engine = DeliveryEngine::new(store, DeliveryConfig::default(), Arc::new(RealClock))?;
//!
//! engine.start().await?;
//! // ... later
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod engine;
pub mod error;
pub mod handoff;
pub mod retry;
pub mod scheduler;
pub mod worker;
pub mod worker_pool;

pub use engine::{DeliveryConfig, DeliveryEngine, EngineStats, StorageErrorPolicy};
pub use error::{DeliveryError, Result};
pub use scheduler::{EnqueueSignal, Scheduler};

/// Default number of concurrent delivery workers.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Default number of entries read per scheduler pass.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Default scheduler idle interval in milliseconds.
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 1_000;

/// Default fixed retry backoff in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 10_000;
