//! Delivery worker: receives claimed entries and records their outcome.
//!
//! Delivery failures never stop a worker; they feed the retry policy. Only
//! store failures escape `process_entry`, and the worker loop applies the
//! configured `StorageErrorPolicy` to them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_core::{QueueEntry, RequestStore};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{DeliveryClient, DeliveryRequest},
    engine::{EngineStats, StorageErrorPolicy},
    error::{DeliveryError, ErrorCategory, Result},
    handoff::HandoffReceiver,
    retry::{RetryDecision, RetryPolicy},
};

/// Final state of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Downstream answered `200`; the entry was deleted.
    Delivered,
    /// The entry was rescheduled.
    Retried {
        /// New `delivery_time` of the entry.
        delivery_time: i64,
        /// Remaining retry budget.
        ttl: u32,
    },
    /// The retry budget ran out; the entry was deleted.
    Expired,
}

/// Settings shared by every worker in a pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Downstream base URL.
    pub target_url: String,
    /// Policy applied to failed attempts.
    pub retry_policy: RetryPolicy,
    /// Reaction to store failures.
    pub storage_error_policy: StorageErrorPolicy,
}

/// Individual worker that relays entries downstream.
pub struct DeliveryWorker {
    id: usize,
    store: Arc<dyn RequestStore>,
    config: WorkerConfig,
    client: Arc<DeliveryClient>,
    receiver: HandoffReceiver,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
}

impl DeliveryWorker {
    /// Creates a new delivery worker.
    pub fn new(
        id: usize,
        store: Arc<dyn RequestStore>,
        config: WorkerConfig,
        client: Arc<DeliveryClient>,
        receiver: HandoffReceiver,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { id, store, config, client, receiver, stats, cancellation_token }
    }

    /// Main worker loop: takes entries from the hand-off until cancelled.
    ///
    /// An attempt already under way when shutdown fires runs to completion.
    ///
    /// # Errors
    ///
    /// Under `StorageErrorPolicy::Halt`, returns the storage failure that
    /// stopped the worker after cancelling the shared token.
    pub async fn run(&self) -> Result<()> {
        while let Some(entry) = self.receiver.recv(&self.cancellation_token).await {
            let entry_id = entry.id;
            if let Err(error) = self.process_entry(entry).await {
                self.stats.write().await.storage_failures += 1;
                error!(
                    worker_id = self.id,
                    entry_id = %entry_id,
                    error = %error,
                    "failed to record delivery outcome"
                );

                if self.config.storage_error_policy == StorageErrorPolicy::Halt {
                    self.cancellation_token.cancel();
                    return Err(error);
                }
            }
        }

        debug!(worker_id = self.id, "hand-off closed or shutdown requested");
        Ok(())
    }

    /// Delivers one entry and applies the outcome to the store.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if the delete or reschedule fails.
    pub async fn process_entry(&self, entry: QueueEntry) -> Result<DeliveryOutcome> {
        self.stats.write().await.in_flight += 1;
        let result = self.attempt_delivery(&entry).await;
        self.stats.write().await.in_flight -= 1;
        result
    }

    async fn attempt_delivery(&self, entry: &QueueEntry) -> Result<DeliveryOutcome> {
        // Outcome writes run inline: one small transaction per attempt.
        let request = DeliveryRequest::for_entry(entry, &self.config.target_url);

        let result = self.client.deliver(request).await.and_then(|response| {
            if response.is_success() {
                Ok(response)
            } else {
                Err(DeliveryError::unexpected_status(response.status_code))
            }
        });

        match result {
            Ok(response) => {
                self.store.delete(entry)?;
                self.stats.write().await.delivered += 1;
                info!(
                    worker_id = self.id,
                    entry_id = %entry.id,
                    duration_ms = response.duration.as_millis(),
                    "entry delivered"
                );
                Ok(DeliveryOutcome::Delivered)
            },
            Err(error) => self.handle_failed_delivery(entry, &error).await,
        }
    }

    async fn handle_failed_delivery(
        &self,
        entry: &QueueEntry,
        error: &DeliveryError,
    ) -> Result<DeliveryOutcome> {
        match self.config.retry_policy.decide(entry) {
            RetryDecision::Retry { next } => {
                self.store.reschedule(entry, &next)?;
                self.stats.write().await.retried += 1;
                warn!(
                    worker_id = self.id,
                    entry_id = %entry.id,
                    error = %error,
                    category = %ErrorCategory::from(error),
                    ttl = next.ttl,
                    next_attempt_at = %DateTime::<Utc>::from_timestamp_nanos(next.delivery_time),
                    "delivery failed, entry rescheduled"
                );
                Ok(DeliveryOutcome::Retried { delivery_time: next.delivery_time, ttl: next.ttl })
            },
            RetryDecision::Expire => {
                self.store.delete(entry)?;
                self.stats.write().await.expired += 1;
                warn!(
                    worker_id = self.id,
                    entry_id = %entry.id,
                    error = %error,
                    category = %ErrorCategory::from(error),
                    "delivery failed, retry budget exhausted, entry expired"
                );
                Ok(DeliveryOutcome::Expired)
            },
        }
    }
}
