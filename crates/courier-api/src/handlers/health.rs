//! Health check handlers for service monitoring.
//!
//! `/_courier/health` verifies the request store can serve reads and
//! reports queue depth with the delivery counters. `/_courier/live` only
//! proves the HTTP server responds.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use courier_core::{Clock, RequestStore};
use courier_delivery::EngineStats;
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Request store check
    pub storage: ComponentHealth,
    /// Entries currently held by the store, when readable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<usize>,
    /// Snapshot of the delivery engine counters
    pub delivery: EngineStats,
    /// Service version information
    pub version: String,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Store reachable
    Healthy,
    /// Store failing
    Unhealthy,
}

/// Health status for an individual component.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component status
    pub status: ComponentStatus,
    /// Error message if the component is down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response time in milliseconds
    pub response_time_ms: u64,
}

/// Component-level health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is healthy
    Up,
    /// Component is failing
    Down,
}

/// Health service that owns the clock so checks are testable.
pub struct HealthService {
    clock: Arc<dyn Clock>,
}

impl HealthService {
    /// Creates a new health service with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Checks the store and assembles the health report.
    ///
    /// Blocks on store reads; the handler runs it on the blocking pool.
    pub fn health_check(&self, store: &dyn RequestStore, delivery: EngineStats) -> HealthResponse {
        let timestamp = DateTime::<Utc>::from(self.clock.now_system());
        let start = self.clock.now();

        let (storage_status, message) = match store.health_check() {
            Ok(()) => (ComponentStatus::Up, None),
            Err(e) => {
                error!(error = %e, "request store health check failed");
                (ComponentStatus::Down, Some(format!("request store unavailable: {e}")))
            },
        };
        let elapsed = self.clock.now().saturating_duration_since(start);

        let queue_depth = match storage_status {
            ComponentStatus::Up => store.len().ok(),
            ComponentStatus::Down => None,
        };

        let status = match storage_status {
            ComponentStatus::Up => HealthStatus::Healthy,
            ComponentStatus::Down => HealthStatus::Unhealthy,
        };

        HealthResponse {
            status,
            timestamp,
            storage: ComponentHealth {
                status: storage_status,
                message,
                response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            },
            queue_depth,
            delivery,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check endpoint handler.
///
/// Responds `503` when the request store cannot serve reads.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let delivery = state.stats.read().await.clone();
    let store = state.store.clone();
    let service = HealthService::new(state.clock.clone());

    let response =
        match tokio::task::spawn_blocking(move || service.health_check(store.as_ref(), delivery))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "health check task failed");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            },
        };

    let status_code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    debug!(status = ?response.status, queue_depth = ?response.queue_depth, "health check completed");

    (status_code, Json(response)).into_response()
}

/// Liveness probe. Touches no dependencies.
#[instrument(name = "liveness_check", skip(state))]
pub async fn liveness_check(State(state): State<AppState>) -> Response {
    let response = serde_json::json!({
        "status": "alive",
        "timestamp": DateTime::<Utc>::from(state.clock.now_system()),
        "service": "courier"
    });

    (StatusCode::OK, Json(response)).into_response()
}
