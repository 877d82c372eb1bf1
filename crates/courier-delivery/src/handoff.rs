//! Rendezvous hand-off between the scheduler and the worker pool.
//!
//! `send` completes only once a worker has taken the entry, so the
//! scheduler can never claim ahead of available workers. The channel is an
//! mpsc with a single slot plus a oneshot acknowledgement per entry; a
//! worker that pulls an entry whose sender already gave up (shutdown) sees
//! the failed acknowledgement and drops it, so every entry is owned by
//! exactly one side.

use std::sync::Arc;

use courier_core::QueueEntry;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

struct Handoff {
    entry: QueueEntry,
    ack: oneshot::Sender<()>,
}

/// Why an entry could not be handed to a worker.
///
/// The entry is returned so the caller can release its claim.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// Shutdown fired before a worker took the entry.
    #[error("hand-off of entry {} cancelled by shutdown", .0.id)]
    Cancelled(QueueEntry),
    /// Every receiver is gone.
    #[error("hand-off of entry {} failed: no worker is receiving", .0.id)]
    Closed(QueueEntry),
}

impl HandoffError {
    /// The entry that was not handed off.
    pub fn into_entry(self) -> QueueEntry {
        match self {
            Self::Cancelled(entry) | Self::Closed(entry) => entry,
        }
    }
}

/// Scheduler side of the hand-off.
#[derive(Debug)]
pub struct HandoffSender {
    tx: mpsc::Sender<Handoff>,
}

/// Worker side of the hand-off, shared by every worker.
#[derive(Debug, Clone)]
pub struct HandoffReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Handoff>>>,
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handoff").field("entry", &self.entry.id).finish_non_exhaustive()
    }
}

/// Creates a connected sender/receiver pair.
pub fn channel() -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { tx }, HandoffReceiver { rx: Arc::new(Mutex::new(rx)) })
}

impl HandoffSender {
    /// Blocks until a worker takes `entry`, or `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the entry back inside `HandoffError` if no worker took it.
    pub async fn send(
        &self,
        entry: QueueEntry,
        token: &CancellationToken,
    ) -> Result<(), HandoffError> {
        let permit = tokio::select! {
            biased;
            () = token.cancelled() => return Err(HandoffError::Cancelled(entry)),
            permit = self.tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => return Err(HandoffError::Closed(entry)),
            },
        };

        let (ack, mut acked) = oneshot::channel();
        permit.send(Handoff { entry: entry.clone(), ack });

        tokio::select! {
            biased;
            result = &mut acked => match result {
                Ok(()) => Ok(()),
                Err(_) => Err(HandoffError::Closed(entry)),
            },
            () = token.cancelled() => {
                // Closing first makes a concurrent ack either land before
                // this point or fail on the worker side.
                acked.close();
                match acked.try_recv() {
                    Ok(()) => Ok(()),
                    Err(_) => Err(HandoffError::Cancelled(entry)),
                }
            },
        }
    }
}

impl HandoffReceiver {
    /// Waits for the next entry, or returns `None` once `token` is cancelled
    /// or the sender is gone.
    pub async fn recv(&self, token: &CancellationToken) -> Option<QueueEntry> {
        loop {
            let handoff = tokio::select! {
                biased;
                () = token.cancelled() => return None,
                handoff = async { self.rx.lock().await.recv().await } => handoff?,
            };

            if handoff.ack.send(()).is_ok() {
                return Some(handoff.entry);
            }
            // Sender retracted the entry during shutdown.
        }
    }
}
