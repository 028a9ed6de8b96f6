//! Shared persistence errors.

use thiserror::Error;

/// Errors from durable state stores (atomic tmp-write + rename files).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Corrupt store at {path}: {reason}")]
    Corrupt { path: String, reason: String },
}
