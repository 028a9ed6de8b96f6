//! Sandbox execution errors.

use thiserror::Error;

/// Errors from the sandboxed-exec primitive.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to spawn command: {0}")]
    SpawnFailed(String),

    #[error("Execution aborted")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
