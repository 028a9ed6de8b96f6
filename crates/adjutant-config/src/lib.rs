//! # Adjutant Config
//!
//! Configuration management: TOML schema with serde defaults, a loader
//! with `${VAR}` environment expansion, and a validator that fails fast
//! on unusable setups (no model key, no enabled transport).

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
