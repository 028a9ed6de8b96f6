//! Model endpoint errors.

use thiserror::Error;

/// Errors from the language-model endpoint.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request aborted")]
    Aborted,

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Whether this error was caused by cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ModelError::Aborted)
    }
}
