//! # Adjutant Protocols
//!
//! Shared protocol layer for the Adjutant runtime: conversation message
//! types, the tool contract, transport and model-client traits, and the
//! sandboxed-exec primitive. Every other crate in the workspace speaks
//! these types.

pub mod error;
pub mod model;
pub mod sandbox;
pub mod tool;
pub mod transport;
pub mod types;

pub use error::*;
pub use model::{ModelClient, ModelRequest, ModelResponse};
pub use sandbox::{ExecOutcome, ExecRequest, SandboxExec, MAX_STREAM_CHARS};
pub use tool::{Tool, ToolContext, ToolDefinition, ToolResult};
pub use transport::{
    ImageAttachment, InboundMessage, MessageHandler, OutboundMessage, Transport,
    TransportCommand, NO_REPLY,
};
pub use types::{ContentBlock, Role, SessionKey, SessionMessage};
