//! Media errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("could not decode image: {0}")]
    Decode(String),

    #[error("could not encode image: {0}")]
    Encode(String),

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("base64 decode error: {0}")]
    Base64(String),
}
