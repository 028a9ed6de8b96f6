//! Transport errors.

use thiserror::Error;

/// Errors from transport adapters.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Transport not started")]
    NotStarted,

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}
