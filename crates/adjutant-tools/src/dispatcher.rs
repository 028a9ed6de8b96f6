//! Tool dispatcher.
//!
//! Validates parameters against each tool's declared JSON schema,
//! executes, and feeds every return value through the result pipeline.
//! All failure modes surface as error text blocks for the model to
//! self-correct on; dispatch never propagates an error upward.

use std::sync::Arc;

use dashmap::DashMap;
use jsonschema::Validator;
use tracing::{debug, warn};

use adjutant_protocols::{ContentBlock, ToolContext, ToolDefinition, ToolError, ToolResult};

use crate::pipeline::apply_pipeline;
use crate::registry::ToolRegistry;

/// Dispatcher over a registry, with schema validators compiled once per
/// tool.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    validators: DashMap<String, Arc<Validator>>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            validators: DashMap::new(),
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Execute one tool call and return the `tool_result` block that
    /// answers it.
    pub async fn dispatch(
        &self,
        call_id: &str,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> ContentBlock {
        let result = self.run_tool(call_id, name, input, ctx).await;
        let is_error = result.is_error();
        let result = apply_pipeline(result);

        ContentBlock::ToolResult {
            tool_use_id: call_id.to_string(),
            content: result.content,
            is_error,
        }
    }

    async fn run_tool(
        &self,
        call_id: &str,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> ToolResult {
        let Some(tool) = self.registry.get(name) else {
            warn!(tool = name, "unknown tool requested");
            return ToolResult::error(format!("unknown tool '{}'", name));
        };

        if let Err(message) = self.validate(name, tool.definition(), &input) {
            return ToolResult::error(format!("invalid parameters for '{}': {}", name, message));
        }

        debug!(tool = name, call = call_id, "executing tool");
        match tool.execute(call_id, input, ctx).await {
            Ok(result) => result,
            Err(ToolError::Aborted) => ToolResult::error("execution aborted"),
            Err(e) => {
                warn!(tool = name, "tool execution failed: {}", e);
                ToolResult::error(e.to_string())
            }
        }
    }

    /// Validate input against the tool's parameter schema. The compiled
    /// validator is cached per tool name.
    fn validate(
        &self,
        name: &str,
        definition: &ToolDefinition,
        input: &serde_json::Value,
    ) -> Result<(), String> {
        let validator = match self.validators.get(name) {
            Some(v) => v.clone(),
            None => {
                let compiled = jsonschema::validator_for(&definition.parameters)
                    .map_err(|e| format!("unusable parameter schema: {}", e))?;
                let compiled = Arc::new(compiled);
                self.validators.insert(name.to_string(), compiled.clone());
                compiled
            }
        };

        let mut errors = validator.iter_errors(input);
        if let Some(first) = errors.next() {
            return Err(first.to_string());
        }
        Ok(())
    }
}
