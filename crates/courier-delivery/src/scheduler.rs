//! Scheduler loop promoting due entries to the worker pool.
//!
//! One scheduler runs per store. Each pass reads the earliest `batch_size`
//! entries, claims every due unscheduled one (`scheduled=true`, persisted)
//! and hands it off, blocking until a worker accepts. Because the store
//! yields entries in `(delivery_time, id)` order, the pass stops at the
//! first entry that is not yet due.
//!
//! Claims carry no lease. An entry left at `scheduled=true` by a crash or a
//! failed delete is skipped until `release_claims` runs, which the engine
//! only does at startup with `release_claims_on_startup` set.
//! Such entries still occupy the head of every batch, so `batch_size` stuck
//! claims at the front of the queue stall every later due entry.

use std::{sync::Arc, time::Duration};

use courier_core::{Clock, RequestStore};
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    engine::{EngineStats, StorageErrorPolicy},
    error::Result,
    handoff::HandoffSender,
    worker_pool::WorkerPool,
};

/// Wakes the scheduler out of its idle wait after an enqueue.
///
/// Raising the signal while the scheduler is busy stores a single permit,
/// so the next idle wait returns immediately instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct EnqueueSignal {
    notify: Arc<Notify>,
}

impl EnqueueSignal {
    /// Creates a new signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals that a new entry was stored.
    pub fn notify(&self) {
        self.notify.notify_one();
    }

    /// Waits for the next signal.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Entries read per pass.
    pub batch_size: usize,
    /// Wait after a pass that dispatched nothing.
    pub idle_interval: Duration,
    /// Reaction to store failures.
    pub storage_error_policy: StorageErrorPolicy,
}

/// Single-task dispatcher owning the worker pool.
pub struct Scheduler {
    store: Arc<dyn RequestStore>,
    handoff: HandoffSender,
    worker_pool: Option<WorkerPool>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    signal: EnqueueSignal,
}

impl Scheduler {
    /// Creates a scheduler feeding `handoff`.
    pub fn new(
        store: Arc<dyn RequestStore>,
        handoff: HandoffSender,
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
        signal: EnqueueSignal,
    ) -> Self {
        Self {
            store,
            handoff,
            worker_pool: None,
            config,
            clock,
            stats,
            cancellation_token,
            signal,
        }
    }

    /// Attaches the pool that is drained when the scheduler stops.
    #[must_use]
    pub fn with_worker_pool(mut self, worker_pool: WorkerPool) -> Self {
        self.worker_pool = Some(worker_pool);
        self
    }

    /// Runs passes until the cancellation token fires, then drains the
    /// worker pool.
    ///
    /// # Errors
    ///
    /// Under `StorageErrorPolicy::Halt`, returns the first storage failure
    /// seen by the scheduler or any worker. A panicked worker surfaces as
    /// `WorkerPanic`.
    pub async fn run(mut self) -> Result<()> {
        info!(
            batch_size = self.config.batch_size,
            idle_interval_ms = self.config.idle_interval.as_millis(),
            "scheduler starting"
        );

        let mut failure = None;
        while !self.cancellation_token.is_cancelled() {
            match self.run_pass().await {
                Ok(0) => self.idle().await,
                Ok(dispatched) => debug!(dispatched, "scheduler pass complete"),
                Err(error) => {
                    self.stats.write().await.storage_failures += 1;
                    error!(error = %error, "scheduler pass failed");

                    if self.config.storage_error_policy == StorageErrorPolicy::Halt {
                        self.cancellation_token.cancel();
                        failure = Some(error);
                        break;
                    }
                    self.idle().await;
                },
            }
        }

        info!("scheduler stopping");
        let drained = match self.worker_pool.take() {
            Some(worker_pool) => worker_pool.drain().await,
            None => Ok(()),
        };

        match failure {
            Some(error) => Err(error),
            None => drained,
        }
    }

    /// Performs one pass and returns the number of entries handed off.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if reading the batch, claiming an entry, or
    /// releasing an interrupted claim fails. A failed claim is never handed
    /// off.
    pub async fn run_pass(&self) -> Result<usize> {
        // Store calls run inline: each is one short single-key transaction.
        let batch = self.store.next(self.config.batch_size)?;
        let now = self.clock.now_nanos();
        let mut dispatched = 0;

        for entry in batch {
            if !entry.is_due(now) {
                break;
            }
            if entry.scheduled {
                continue;
            }
            if self.cancellation_token.is_cancelled() {
                break;
            }

            let claimed = entry.claimed();
            self.store.put(&claimed)?;

            match self.handoff.send(claimed, &self.cancellation_token).await {
                Ok(()) => {
                    dispatched += 1;
                    self.stats.write().await.dispatched += 1;
                    debug!(entry_id = %entry.id, "entry dispatched");
                },
                Err(interrupted) => {
                    let entry = interrupted.into_entry().released();
                    self.store.put(&entry)?;
                    info!(entry_id = %entry.id, "hand-off interrupted, claim released");
                    break;
                },
            }
        }

        Ok(dispatched)
    }

    async fn idle(&self) {
        tokio::select! {
            () = self.clock.sleep(self.config.idle_interval) => {},
            () = self.signal.notified() => debug!("scheduler woken by enqueue"),
            () = self.cancellation_token.cancelled() => {},
        }
    }
}

/// Clears every persisted claim.
///
/// Only safe while no scheduler is running against the store.
///
/// # Errors
///
/// Returns `StorageFailure` if the scan or any write fails.
pub fn release_claims(store: &dyn RequestStore) -> Result<usize> {
    let claimed: Vec<_> = store.next(usize::MAX)?.into_iter().filter(|e| e.scheduled).collect();

    for entry in &claimed {
        store.put(&entry.released())?;
    }

    if !claimed.is_empty() {
        warn!(released = claimed.len(), "released claims left by a previous run");
    }
    Ok(claimed.len())
}
