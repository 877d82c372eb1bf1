//! HTTP client for relaying stored requests downstream.
//!
//! Requests carry only a method and a URL: the relay stores no headers and
//! no body, so the downstream server sees a bare re-issue of the original
//! request line.

use std::time::{Duration, Instant};

use courier_core::EntryId;
use reqwest::{Method, Url};
use tracing::{debug, info_span, warn, Instrument};

use crate::error::{DeliveryError, Result};

/// Configuration for the delivery client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for a single delivery attempt.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: concat!("courier/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 10,
        }
    }
}

/// Pooled HTTP client shared by every worker.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

/// One delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Entry being delivered, for correlation only.
    pub entry_id: EntryId,
    /// Fully-qualified destination URL.
    pub url: String,
    /// HTTP method token.
    pub method: String,
    /// Remaining retry budget, for correlation only.
    pub ttl: u32,
}

impl DeliveryRequest {
    /// Builds the request for an entry against a downstream base URL.
    pub fn for_entry(entry: &courier_core::QueueEntry, base_url: &str) -> Self {
        Self {
            entry_id: entry.id,
            url: join_url(base_url, &entry.target_path),
            method: entry.method.clone(),
            ttl: entry.ttl,
        }
    }
}

/// Outcome of a request that reached the downstream server.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Total duration of the request.
    pub duration: Duration,
}

impl DeliveryResponse {
    /// Only `200 OK` counts as a successful delivery.
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be configured with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    ///
    /// # Errors
    ///
    /// See [`DeliveryClient::new`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Issues the request and reports the downstream status.
    ///
    /// Any response, whatever its status, is returned as `Ok`; callers decide
    /// success with [`DeliveryResponse::is_success`].
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the method or URL cannot be parsed
    /// - `Timeout` if no response arrives within the configured timeout
    /// - `NetworkError` for any other transport failure
    pub async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryResponse> {
        let span = info_span!(
            "relay_delivery",
            entry_id = %request.entry_id,
            method = %request.method,
            url = %request.url,
            ttl = request.ttl
        );

        async move {
            let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| {
                DeliveryError::invalid_request(format!("invalid method {:?}: {e}", request.method))
            })?;
            let url = Url::parse(&request.url).map_err(|e| {
                DeliveryError::invalid_request(format!("invalid url {:?}: {e}", request.url))
            })?;

            debug!("starting delivery attempt");
            let start_time = Instant::now();

            let response = match self.client.request(method, url).send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    warn!(duration_ms = duration.as_millis(), "request failed: {e}");

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let duration = start_time.elapsed();
            let status_code = response.status().as_u16();
            debug!(status = status_code, duration_ms = duration.as_millis(), "received response");

            Ok(DeliveryResponse { status_code, duration })
        }
        .instrument(span)
        .await
    }
}

/// Joins the downstream base URL and a stored path.
///
/// A trailing `/` on the base is dropped so `http://host/` + `/a` yields
/// `http://host/a`.
pub fn join_url(base_url: &str, target_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if target_path.starts_with('/') {
        format!("{base}{target_path}")
    } else {
        format!("{base}/{target_path}")
    }
}
