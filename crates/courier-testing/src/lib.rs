//! Test infrastructure for deterministic relay testing.
//!
//! Provides an in-memory request store, a controllable clock, a mock
//! downstream server, entry fixtures and a fault-injecting store wrapper.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use courier_core::{enqueue, Clock, EntryId, QueueEntry, RedbRequestStore, RequestStore};

pub mod faulty;
pub mod fixtures;
mod wait;

pub use courier_core::TestClock;
pub use faulty::{FaultyStore, StoreOp};
pub use fixtures::EntryBuilder;
pub use wait::wait_until;
pub use wiremock::MockServer;

/// Test environment with an isolated store and downstream mock.
///
/// Every environment owns a fresh in-memory store, so tests never share
/// queue state.
pub struct TestEnv {
    /// HTTP mock standing in for the downstream server
    pub http_mock: MockServer,
    /// Deterministic clock shared with anything built from this environment
    pub clock: TestClock,
    store: Arc<RedbRequestStore>,
}

impl TestEnv {
    /// Creates a new environment with an empty store.
    ///
    /// # Errors
    ///
    /// Returns error if the in-memory store cannot be created.
    pub async fn new() -> Result<Self> {
        let store = RedbRequestStore::open_in_memory().context("failed to open test store")?;

        Ok(Self {
            http_mock: MockServer::start().await,
            clock: TestClock::new(),
            store: Arc::new(store),
        })
    }

    /// The concrete store.
    pub fn store(&self) -> &RedbRequestStore {
        &self.store
    }

    /// Store handle for components that take a trait object.
    pub fn store_handle(&self) -> Arc<dyn RequestStore> {
        self.store.clone()
    }

    /// Clock handle for components that take a trait object.
    pub fn clock_handle(&self) -> Arc<dyn Clock> {
        Arc::new(self.clock.clone())
    }

    /// Base URL of the downstream mock.
    pub fn target_url(&self) -> String {
        self.http_mock.uri()
    }

    /// Enqueues a request the way the ingress does.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the write.
    pub fn enqueue(&self, method: &str, target_path: &str, ttl: u32) -> Result<QueueEntry> {
        enqueue(self.store.as_ref(), &self.clock, method, target_path, ttl)
            .context("failed to enqueue test entry")
    }

    /// Stores a prebuilt entry.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the write.
    pub fn insert(&self, entry: &QueueEntry) -> Result<()> {
        self.store.put(entry).context("failed to insert test entry")
    }

    /// Every stored entry in key order.
    ///
    /// # Errors
    ///
    /// Returns error if the scan fails.
    pub fn entries(&self) -> Result<Vec<QueueEntry>> {
        self.store.next(usize::MAX).context("failed to scan store")
    }

    /// The stored entry with `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the scan fails.
    pub fn find_entry(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        Ok(self.entries()?.into_iter().find(|e| e.id == id))
    }

    /// Number of requests the downstream mock has received.
    pub async fn received_count(&self) -> usize {
        self.http_mock.received_requests().await.map_or(0, |requests| requests.len())
    }

    /// Polls until the store holds no entries.
    ///
    /// # Errors
    ///
    /// Returns error if the timeout elapses first.
    pub async fn wait_for_empty_queue(&self, timeout: Duration) -> Result<()> {
        let store = self.store.clone();
        wait_until(timeout, move || store.is_empty().unwrap_or(false))
            .await
            .context("queue did not drain")
    }
}
