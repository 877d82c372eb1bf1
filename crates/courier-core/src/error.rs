//! Error types for queue storage operations.
//!
//! Every failure of the durable queue surfaces as a `StorageError`,
//! whatever layer produced it (engine I/O, transaction, or value encoding).
//! Callers decide whether a storage failure is fatal; nothing in this crate
//! terminates the process.

use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by a `RequestStore`.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The database file could not be opened or created.
    #[error("failed to open request store: {0}")]
    Open(String),

    /// A read or write transaction could not begin or commit.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The requests table could not be opened.
    #[error("table error: {0}")]
    Table(String),

    /// Reading a record failed.
    #[error("read error: {0}")]
    Read(String),

    /// Inserting or removing a record failed.
    #[error("write error: {0}")]
    Write(String),

    /// An entry could not be encoded.
    #[error("serialization error: {0}")]
    Serialize(String),

    /// A stored value could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// A stored key does not have the 16-byte `(delivery_time, id)` layout.
    #[error("corrupt key: expected 16 bytes, found {len}")]
    CorruptKey {
        /// Length of the offending key
        len: usize,
    },
}

impl StorageError {
    /// Short machine-readable label used in logs and API error bodies.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Transaction(_) => "transaction",
            Self::Table(_) => "table",
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::Serialize(_) => "serialize",
            Self::Deserialize(_) => "deserialize",
            Self::CorruptKey { .. } => "corrupt_key",
        }
    }
}
