//! Core conversation types.

mod content;
mod message;
mod session_key;

pub use content::ContentBlock;
pub use message::{Role, SessionMessage};
pub use session_key::SessionKey;
