//! Courier store-and-forward relay.
//!
//! Main entry point. Accepts any HTTP request, persists it, and relays it
//! to the configured downstream with retries until it succeeds or its
//! retry budget runs out.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use courier_api::{AppState, CliOverrides, Config};
use courier_core::{Clock, RealClock, RedbRequestStore, RequestStore};
use courier_delivery::DeliveryEngine;
use tracing::{error, info};

/// Durable store-and-forward HTTP relay.
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
struct Cli {
    /// Downstream base URL every request is relayed to.
    #[arg(long, value_name = "URL")]
    hostname: Option<String>,

    /// Number of concurrent delivery workers.
    #[arg(long, value_name = "N")]
    max_concurrent_requests: Option<usize>,

    /// Configuration file (defaults to ./courier.toml when present).
    #[arg(long, value_name = "PATH", env = "COURIER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let overrides = CliOverrides {
        hostname: cli.hostname,
        max_concurrent_requests: cli.max_concurrent_requests,
    };
    let config = Config::load_with(cli.config.as_deref(), &overrides)?;

    init_tracing(&config.rust_log)?;

    info!(
        target_url = %config.target_url,
        storage_path = %config.storage_path.display(),
        workers = config.max_concurrent_requests,
        storage_error_policy = ?config.storage_error_policy,
        "Starting courier"
    );

    let store: Arc<dyn RequestStore> = Arc::new(
        RedbRequestStore::open(&config.storage_path).context("Failed to open request store")?,
    );
    let pending = store.len().context("Failed to read request store")?;
    info!(pending, "Request store opened");

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());

    let mut engine = DeliveryEngine::new(store.clone(), config.to_delivery_config(), clock.clone())
        .context("Invalid delivery configuration")?;
    engine.start().await.context("Failed to start delivery engine")?;

    let state = AppState::new(store, clock, engine.waker())
        .with_default_ttl(config.default_ttl)
        .with_stats(engine.stats_handle());

    // The server also stops when the engine halts on a storage failure.
    let token = engine.cancellation_token();
    let shutdown = async move {
        tokio::select! {
            () = courier_api::shutdown_signal() => {},
            () = token.cancelled() => {
                error!("Delivery engine stopped, shutting down ingress");
            },
        }
    };

    let addr = config.parse_server_addr()?;
    let served = courier_api::start_server(state, addr, config.request_timeout(), shutdown).await;

    // Drain in-flight deliveries even if the server failed.
    let drained = engine.shutdown().await;

    served.context("HTTP server failed")?;
    drained.context("Delivery engine failed")?;

    info!("Courier shutdown complete");
    Ok(())
}

/// Initializes tracing. `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}
