//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. Timeout enforcement
//! 4. Handler execution
//!
//! Service routes are nested under `/_courier` so they never shadow a
//! relayed path. Everything else falls through to the relay handler.

use std::{future::Future, net::SocketAddr, time::Duration};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::{handlers, AppState};

/// Prefix of the service routes.
pub const SERVICE_PREFIX: &str = "/_courier";

/// Creates the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::{sync::Arc, time::Duration};
///
/// use courier_api::{create_router, AppState};
/// use courier_core::{RealClock, RedbRequestStore};
/// use courier_delivery::EnqueueSignal;
///
/// let store = Arc::new(RedbRequestStore::open("requests.db").unwrap());
/// let state = AppState::new(store, Arc::new(RealClock::new()), EnqueueSignal::new());
/// let app = create_router(state, Duration::from_secs(10));
/// ```
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let service_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/live", get(handlers::liveness_check));

    Router::new()
        .nest(SERVICE_PREFIX, service_routes)
        .fallback(handlers::relay_request)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Adds an `X-Request-Id` header to every response.
async fn inject_request_id(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Serves the ingress until `shutdown` resolves.
///
/// In-flight requests finish before this returns.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound.
pub async fn start_server<F>(
    state: AppState,
    addr: SocketAddr,
    request_timeout: Duration,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state, request_timeout);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for CTRL+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
