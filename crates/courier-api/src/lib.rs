//! Courier ingress API and service configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use courier_core::{Clock, RequestStore, DEFAULT_TTL};
use courier_delivery::{EngineStats, EnqueueSignal};
use tokio::sync::RwLock;

pub mod config;
pub mod handlers;
pub mod server;

pub use config::{CliOverrides, Config};
pub use server::{create_router, shutdown_signal, start_server};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Durable queue that ingested requests are written to
    pub store: Arc<dyn RequestStore>,
    /// Time source for new entries and health timestamps
    pub clock: Arc<dyn Clock>,
    /// Raised after every successful enqueue
    pub signal: EnqueueSignal,
    /// Retry budget given to new entries
    pub default_ttl: u32,
    /// Live delivery counters reported by the health endpoint
    pub stats: Arc<RwLock<EngineStats>>,
}

impl AppState {
    /// Creates state with the default TTL and detached statistics.
    pub fn new(store: Arc<dyn RequestStore>, clock: Arc<dyn Clock>, signal: EnqueueSignal) -> Self {
        Self {
            store,
            clock,
            signal,
            default_ttl: DEFAULT_TTL,
            stats: Arc::new(RwLock::new(EngineStats::default())),
        }
    }

    /// Sets the retry budget given to new entries.
    #[must_use]
    pub fn with_default_ttl(mut self, default_ttl: u32) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    /// Reports the given engine's counters from the health endpoint.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<RwLock<EngineStats>>) -> Self {
        self.stats = stats;
        self
    }
}
