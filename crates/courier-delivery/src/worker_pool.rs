//! Worker pool management with structured concurrency.
//!
//! Workers are spawned once and run until the shared cancellation token
//! fires. Draining waits for every worker to finish its current attempt;
//! there is no hard deadline because each attempt is bounded by the HTTP
//! client timeout.

use std::sync::Arc;

use courier_core::RequestStore;
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    client::DeliveryClient,
    engine::EngineStats,
    error::{DeliveryError, Result},
    handoff::HandoffReceiver,
    worker::{DeliveryWorker, WorkerConfig},
};

/// Supervised set of delivery workers sharing one hand-off receiver.
pub struct WorkerPool {
    store: Arc<dyn RequestStore>,
    worker_count: usize,
    config: WorkerConfig,
    client: Arc<DeliveryClient>,
    receiver: HandoffReceiver,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<Result<()>>>,
}

impl WorkerPool {
    /// Create a new worker pool with the given configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RequestStore>,
        worker_count: usize,
        config: WorkerConfig,
        client: Arc<DeliveryClient>,
        receiver: HandoffReceiver,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            store,
            worker_count,
            config,
            client,
            receiver,
            stats,
            cancellation_token,
            worker_handles: Vec::new(),
        }
    }

    /// Spawn all configured workers. Returns immediately.
    pub async fn spawn_workers(&mut self) {
        info!(worker_count = self.worker_count, "spawning delivery workers");

        self.stats.write().await.active_workers = self.worker_count;

        for worker_id in 0..self.worker_count {
            let worker = DeliveryWorker::new(
                worker_id,
                self.store.clone(),
                self.config.clone(),
                self.client.clone(),
                self.receiver.clone(),
                self.stats.clone(),
                self.cancellation_token.clone(),
            );

            let handle = tokio::spawn(async move {
                info!(worker_id, "delivery worker starting");

                let result = worker.run().await;

                if let Err(ref error) = result {
                    error!(worker_id, error = %error, "delivery worker terminated with error");
                } else {
                    info!(worker_id, "delivery worker stopped gracefully");
                }

                result
            });

            self.worker_handles.push(handle);
        }
    }

    /// Cancels the pool and waits for every worker to finish its current
    /// attempt.
    ///
    /// # Errors
    ///
    /// Returns the first worker error (a storage failure under the `halt`
    /// policy), or `WorkerPanic` if a worker task panicked.
    pub async fn drain(mut self) -> Result<()> {
        info!(worker_count = self.worker_handles.len(), "draining delivery workers");

        self.cancellation_token.cancel();

        let mut first_error = None;
        for (worker_id, handle) in std::mem::take(&mut self.worker_handles).into_iter().enumerate()
        {
            let result = match handle.await {
                Ok(worker_result) => worker_result,
                Err(join_error) => {
                    error!(worker_id, error = %join_error, "worker task panicked");
                    Err(DeliveryError::WorkerPanic { worker_id, error: join_error.to_string() })
                },
            };

            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        }

        self.stats.write().await.active_workers = 0;

        match first_error {
            Some(error) => {
                warn!(error = %error, "worker pool drained with errors");
                Err(error)
            },
            None => {
                info!("worker pool drained");
                Ok(())
            },
        }
    }

    /// Check if any workers are still running.
    pub fn has_active_workers(&self) -> bool {
        self.worker_handles.iter().any(|h| !h.is_finished())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active_count = self.worker_handles.iter().filter(|h| !h.is_finished()).count();

        if active_count > 0 && !self.cancellation_token.is_cancelled() {
            error!(active_workers = active_count, "worker pool dropped without draining");
            self.cancellation_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use courier_core::RedbRequestStore;

    use super::*;
    use crate::{engine::StorageErrorPolicy, handoff, retry::RetryPolicy};

    fn create_pool(
        worker_count: usize,
        stats: Arc<RwLock<EngineStats>>,
    ) -> (WorkerPool, handoff::HandoffSender) {
        let (tx, rx) = handoff::channel();
        let pool = WorkerPool::new(
            Arc::new(RedbRequestStore::open_in_memory().unwrap()),
            worker_count,
            WorkerConfig {
                target_url: "http://127.0.0.1:1".to_string(),
                retry_policy: RetryPolicy::default(),
                storage_error_policy: StorageErrorPolicy::Continue,
            },
            Arc::new(DeliveryClient::with_defaults().unwrap()),
            rx,
            stats,
            CancellationToken::new(),
        );
        (pool, tx)
    }

    #[tokio::test]
    async fn spawns_configured_number_of_workers() {
        let stats = Arc::new(RwLock::new(EngineStats::default()));
        let (mut pool, _tx) = create_pool(4, stats.clone());

        pool.spawn_workers().await;
        assert_eq!(pool.worker_handles.len(), 4);
        assert_eq!(stats.read().await.active_workers, 4);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(pool.has_active_workers());

        pool.drain().await.expect("drain should succeed");
        assert_eq!(stats.read().await.active_workers, 0);
    }

    #[tokio::test]
    async fn drain_without_workers_completes() {
        let (pool, _tx) = create_pool(2, Arc::new(RwLock::new(EngineStats::default())));
        assert!(!pool.has_active_workers());
        pool.drain().await.expect("drain should succeed");
    }

    #[tokio::test]
    async fn dropping_undrained_pool_cancels_workers() {
        let (mut pool, _tx) = create_pool(1, Arc::new(RwLock::new(EngineStats::default())));
        let token = pool.cancellation_token.clone();
        pool.spawn_workers().await;

        drop(pool);
        assert!(token.is_cancelled());
    }
}
