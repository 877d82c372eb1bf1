//! Delivery engine wiring the scheduler, hand-off and worker pool.

use std::{sync::Arc, time::Duration};

use courier_core::{Clock, RequestStore};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    client::{ClientConfig, DeliveryClient},
    error::{DeliveryError, Result},
    handoff,
    retry::RetryPolicy,
    scheduler::{self, EnqueueSignal, Scheduler, SchedulerConfig},
    worker::WorkerConfig,
    worker_pool::WorkerPool,
};

/// How the pipeline reacts to a failed store operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageErrorPolicy {
    /// Log, count, skip the failing operation and keep running.
    #[default]
    Continue,
    /// Cancel the pipeline and surface the failure from `shutdown`.
    Halt,
}

/// Configuration for the delivery engine.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Number of concurrent delivery workers.
    pub worker_count: usize,
    /// Entries read per scheduler pass.
    pub batch_size: usize,
    /// Scheduler wait after a pass that dispatched nothing.
    pub idle_interval: Duration,
    /// Downstream base URL every entry's path is appended to.
    pub target_url: String,
    /// HTTP client configuration.
    pub client_config: ClientConfig,
    /// Policy applied to failed attempts.
    pub retry_policy: RetryPolicy,
    /// Reaction to store failures.
    pub storage_error_policy: StorageErrorPolicy,
    /// Clear claims left by a previous process before the first pass.
    pub release_claims_on_startup: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            idle_interval: Duration::from_millis(crate::DEFAULT_IDLE_INTERVAL_MS),
            target_url: "http://google.com".to_string(),
            client_config: ClientConfig::default(),
            retry_policy: RetryPolicy::default(),
            storage_error_policy: StorageErrorPolicy::default(),
            release_claims_on_startup: false,
        }
    }
}

impl DeliveryConfig {
    fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(DeliveryError::configuration("worker_count must be greater than zero"));
        }
        if self.batch_size == 0 {
            return Err(DeliveryError::configuration("batch_size must be greater than zero"));
        }
        Url::parse(&self.target_url).map_err(|e| {
            DeliveryError::configuration(format!("invalid target url {:?}: {e}", self.target_url))
        })?;
        Ok(())
    }
}

/// Counters for engine monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Number of running delivery workers.
    pub active_workers: usize,
    /// Entries handed to a worker since startup.
    pub dispatched: u64,
    /// Attempts currently in progress.
    pub in_flight: u64,
    /// Entries deleted after a `200`.
    pub delivered: u64,
    /// Failed attempts that were rescheduled.
    pub retried: u64,
    /// Entries deleted with an exhausted retry budget.
    pub expired: u64,
    /// Store operations that failed.
    pub storage_failures: u64,
}

/// Main delivery engine coordinating the scheduler and its workers.
pub struct DeliveryEngine {
    store: Arc<dyn RequestStore>,
    config: DeliveryConfig,
    client: Arc<DeliveryClient>,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    signal: EnqueueSignal,
    scheduler_handle: Option<JoinHandle<Result<()>>>,
}

impl DeliveryEngine {
    /// Creates a new delivery engine.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for a zero worker count or batch size,
    /// an unparsable target URL, or an HTTP client that cannot be built.
    pub fn new(
        store: Arc<dyn RequestStore>,
        config: DeliveryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(DeliveryClient::new(config.client_config.clone())?);

        Ok(Self {
            store,
            config,
            client,
            clock,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            cancellation_token: CancellationToken::new(),
            signal: EnqueueSignal::new(),
            scheduler_handle: None,
        })
    }

    /// Spawns the worker pool and the scheduler. Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if releasing stale claims fails.
    pub async fn start(&mut self) -> Result<()> {
        if self.scheduler_handle.is_some() {
            warn!("delivery engine already started");
            return Ok(());
        }

        info!(
            worker_count = self.config.worker_count,
            batch_size = self.config.batch_size,
            target_url = %self.config.target_url,
            "starting delivery engine"
        );

        if self.config.release_claims_on_startup {
            scheduler::release_claims(self.store.as_ref())?;
        }

        let (sender, receiver) = handoff::channel();

        let mut worker_pool = WorkerPool::new(
            self.store.clone(),
            self.config.worker_count,
            WorkerConfig {
                target_url: self.config.target_url.clone(),
                retry_policy: self.config.retry_policy,
                storage_error_policy: self.config.storage_error_policy,
            },
            self.client.clone(),
            receiver,
            self.stats.clone(),
            self.cancellation_token.clone(),
        );
        worker_pool.spawn_workers().await;

        let scheduler = Scheduler::new(
            self.store.clone(),
            sender,
            SchedulerConfig {
                batch_size: self.config.batch_size,
                idle_interval: self.config.idle_interval,
                storage_error_policy: self.config.storage_error_policy,
            },
            self.clock.clone(),
            self.stats.clone(),
            self.cancellation_token.clone(),
            self.signal.clone(),
        )
        .with_worker_pool(worker_pool);

        self.scheduler_handle = Some(tokio::spawn(scheduler.run()));

        info!("delivery engine started");
        Ok(())
    }

    /// Stops dispatching and waits for in-flight attempts to finish.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if the engine halted on a storage failure,
    /// or a panic error if the scheduler or a worker panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down delivery engine");
        self.cancellation_token.cancel();

        let Some(handle) = self.scheduler_handle.take() else {
            info!("delivery engine was not started, shutdown completed immediately");
            return Ok(());
        };

        let result = match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                error!(error = %join_error, "scheduler task panicked");
                Err(DeliveryError::SchedulerPanic { error: join_error.to_string() })
            },
        };

        if result.is_ok() {
            info!("delivery engine stopped");
        }
        result
    }

    /// Token cancelled on shutdown, or by the engine itself when it halts.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Signal the ingress raises after each enqueue.
    pub fn waker(&self) -> EnqueueSignal {
        self.signal.clone()
    }

    /// Returns current engine statistics.
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Shared handle to the live statistics.
    pub fn stats_handle(&self) -> Arc<RwLock<EngineStats>> {
        self.stats.clone()
    }
}

impl Drop for DeliveryEngine {
    fn drop(&mut self) {
        if self.scheduler_handle.is_some() && !self.cancellation_token.is_cancelled() {
            warn!("delivery engine dropped without shutdown, cancelling");
            self.cancellation_token.cancel();
        }
    }
}
