//! Relay ingestion handler.
//!
//! Any request that does not hit a service route is converted into a queue
//! entry and acknowledged as soon as it is durably stored. Delivery to the
//! downstream happens later, so the caller never waits on it.

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use courier_core::{enqueue, StorageError};
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::AppState;

/// Response from successful ingestion.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Hex identifier of the queued entry
    pub entry_id: String,
    /// Always `queued`
    pub status: String,
}

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

/// Queues an inbound request for relay.
///
/// The stored target is the request's path and query; the body and headers
/// are not relayed.
///
/// # Errors
///
/// Responds `500` with code `storage_failure` when the entry cannot be
/// persisted. No entry exists in that case.
#[instrument(name = "relay_request", skip_all, fields(method = %method, uri = %uri))]
pub async fn relay_request(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    let target_path =
        uri.path_and_query().map_or_else(|| uri.path().to_string(), ToString::to_string);
    let method = method.as_str().to_string();

    let store = state.store.clone();
    let clock = state.clock.clone();
    let ttl = state.default_ttl;

    // redb commits block on fsync.
    let stored = tokio::task::spawn_blocking(move || {
        enqueue(store.as_ref(), clock.as_ref(), &method, &target_path, ttl)
    })
    .await;

    match stored {
        Ok(Ok(entry)) => {
            state.signal.notify();
            debug!(entry_id = %entry.id, ttl = entry.ttl, "request queued");
            (
                StatusCode::OK,
                Json(IngestResponse { entry_id: entry.id.to_string(), status: "queued".to_string() }),
            )
                .into_response()
        },
        Ok(Err(e)) => {
            error!(error = %e, "failed to queue request");
            storage_failure(&e)
        },
        Err(join_error) => {
            error!(error = %join_error, "enqueue task failed");
            storage_failure(&StorageError::Write(join_error.to_string()))
        },
    }
}

fn storage_failure(error: &StorageError) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail { code: "storage_failure".to_string(), message: error.to_string() },
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
