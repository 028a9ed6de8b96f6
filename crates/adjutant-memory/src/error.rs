//! Memory errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Consolidation model call failed: {0}")]
    Model(String),

    #[error("Consolidation reply missing markers: {0}")]
    BadReply(String),
}
