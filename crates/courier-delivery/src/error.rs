//! Error types for relay delivery operations.
//!
//! Delivery failures (network, timeout, malformed request, non-200 status)
//! are absorbed by the retry path and never stop a worker. Storage failures
//! are surfaced to the scheduler or worker loop, which applies the
//! configured `StorageErrorPolicy`.

use std::fmt;

use courier_core::StorageError;
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error conditions raised by the delivery pipeline.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Number of seconds before the request timed out
        timeout_seconds: u64,
    },

    /// The stored entry cannot be turned into a valid request.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What made the request invalid
        message: String,
    },

    /// Downstream answered with anything other than `200 OK`.
    #[error("unexpected status: HTTP {status_code}")]
    UnexpectedStatus {
        /// HTTP status code returned by the downstream server
        status_code: u16,
    },

    /// A queue read or write failed.
    #[error("storage failure: {message}")]
    StorageFailure {
        /// Storage error message
        message: String,
    },

    /// Invalid engine or client configuration.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Worker identifier
        worker_id: usize,
        /// Panic payload rendered as text
        error: String,
    },

    /// The scheduler task panicked.
    #[error("scheduler panicked: {error}")]
    SchedulerPanic {
        /// Panic payload rendered as text
        error: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    /// Creates an unexpected status error.
    pub fn unexpected_status(status_code: u16) -> Self {
        Self::UnexpectedStatus { status_code }
    }

    /// Creates a storage failure.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageFailure { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Whether this error is a failed delivery attempt, as opposed to a
    /// failure of the relay itself.
    ///
    /// Delivery failures consume one unit of an entry's TTL and are retried.
    pub fn is_delivery_failure(&self) -> bool {
        match self {
            Self::NetworkError { .. }
            | Self::Timeout { .. }
            | Self::InvalidRequest { .. }
            | Self::UnexpectedStatus { .. } => true,

            Self::StorageFailure { .. }
            | Self::ConfigurationError { .. }
            | Self::WorkerPanic { .. }
            | Self::SchedulerPanic { .. } => false,
        }
    }

    /// Whether this error came from the request store.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::StorageFailure { .. })
    }
}

impl From<StorageError> for DeliveryError {
    fn from(error: StorageError) -> Self {
        Self::storage(error.to_string())
    }
}

/// Category of delivery error for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network connectivity issues and timeouts.
    Network,
    /// Malformed stored requests.
    Request,
    /// Non-200 responses.
    Status,
    /// Request store failures.
    Storage,
    /// Configuration problems.
    Configuration,
    /// Internal system errors.
    Internal,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::NetworkError { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::InvalidRequest { .. } => Self::Request,
            DeliveryError::UnexpectedStatus { .. } => Self::Status,
            DeliveryError::StorageFailure { .. } => Self::Storage,
            DeliveryError::ConfigurationError { .. } => Self::Configuration,
            DeliveryError::WorkerPanic { .. } | DeliveryError::SchedulerPanic { .. } => {
                Self::Internal
            },
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Request => write!(f, "request"),
            Self::Status => write!(f, "status"),
            Self::Storage => write!(f, "storage"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
