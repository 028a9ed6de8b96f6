//! Model-client protocol.
//!
//! The language-model endpoint is an external collaborator; the runtime
//! only depends on this trait. Implementations POST the request to a
//! provider and map the reply onto a [`SessionMessage`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ModelError;
use crate::tool::ToolDefinition;
use crate::types::SessionMessage;

/// One completion request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<SessionMessage>,
    pub max_tokens: u32,
    pub tools: Vec<ToolDefinition>,
}

impl ModelRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<SessionMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
            max_tokens: 8192,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// One completion response: a single assistant message, possibly carrying
/// `tool_use` blocks and a stop reason.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: SessionMessage,
}

/// Core trait for model endpoints.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one completion. Must return promptly with [`ModelError::Aborted`]
    /// when `cancel` fires.
    async fn complete(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, ModelError>;
}
