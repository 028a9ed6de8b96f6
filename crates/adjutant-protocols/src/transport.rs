//! Transport protocol definitions.
//!
//! Transports are adapters for chat platforms (Telegram, Slack, a local
//! CLI, ...). The runtime never talks to a platform directly; it hands a
//! [`MessageHandler`] to each transport and receives fully-shaped
//! [`InboundMessage`]s back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::TransportError;
use crate::types::SessionKey;

/// Sentinel outbound text that suppresses delivery entirely.
pub const NO_REPLY: &str = "NO_REPLY";

/// An inbound conversation input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub text: String,
    pub session_key: SessionKey,
    pub channel_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Whether the originating channel is a group conversation. Carried
    /// explicitly so downstream code never infers it from the session key.
    #[serde(default)]
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

impl InboundMessage {
    pub fn text_only(text: impl Into<String>, session_key: SessionKey) -> Self {
        Self {
            text: text.into(),
            session_key,
            channel_id: String::new(),
            user_id: String::new(),
            user_name: None,
            is_group: false,
            images: Vec::new(),
        }
    }
}

/// A response produced by the runtime for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    /// Whether the transport should drop this message instead of
    /// delivering it.
    pub fn is_suppressed(&self) -> bool {
        self.text.trim() == NO_REPLY
    }
}

/// Raw image payload travelling with a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Base64-encoded bytes.
    pub data: String,
    pub mime_type: String,
}

/// The short command set every transport recognizes. Anything else falls
/// through to the orchestrator as a normal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Stop,
    Reset,
    Status,
    Help,
}

impl FromStr for TransportCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('/') {
            "stop" => Ok(TransportCommand::Stop),
            "reset" => Ok(TransportCommand::Reset),
            "status" => Ok(TransportCommand::Status),
            "help" => Ok(TransportCommand::Help),
            _ => Err(()),
        }
    }
}

/// Handler wired into each transport by the runtime.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one inbound message; `None` means nothing to deliver.
    async fn on_message(&self, inbound: InboundMessage) -> Option<OutboundMessage>;

    /// Process a recognized command.
    async fn on_command(
        &self,
        command: TransportCommand,
        inbound: InboundMessage,
    ) -> Option<OutboundMessage>;
}

/// Core trait for chat transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport id, e.g. "telegram".
    fn id(&self) -> &str;

    /// Connect and begin feeding events to the handler.
    async fn start(&self, handler: Arc<dyn MessageHandler>) -> Result<(), TransportError>;

    /// Disconnect.
    async fn stop(&self) -> Result<(), TransportError>;

    /// Out-of-band delivery used by the scheduler and subagent announces.
    async fn send_to_channel(
        &self,
        channel_id: &str,
        message: OutboundMessage,
    ) -> Result<(), TransportError>;
}
