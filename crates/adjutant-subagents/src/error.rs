//! Subagent errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubagentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Run not found: {0}")]
    NotFound(String),
}
