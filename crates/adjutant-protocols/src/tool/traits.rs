//! Tool trait definition.

use async_trait::async_trait;

use super::{ToolContext, ToolDefinition, ToolResult};
use crate::error::ToolError;

/// Core trait for tools.
///
/// Tools are the executable capabilities the model can invoke. Parameter
/// validation against `definition().parameters` happens in the dispatcher
/// before `execute` is called; implementations may assume the shape but
/// not the semantics of their inputs.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> &ToolDefinition;

    /// Execute the tool.
    ///
    /// `call_id` is the id of the originating `tool_use` block.
    async fn execute(
        &self,
        call_id: &str,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError>;
}
