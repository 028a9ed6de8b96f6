//! Shell execution tool, backed by the sandboxed-exec primitive.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use adjutant_protocols::{
    ExecRequest, SandboxError, SandboxExec, Tool, ToolContext, ToolDefinition, ToolError,
    ToolResult,
};

#[derive(Debug, Deserialize)]
struct ExecParams {
    command: String,
    /// Timeout in milliseconds (default: 120000).
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    120_000
}

/// Run a shell command in the sandbox.
pub struct ExecTool {
    definition: ToolDefinition,
    sandbox: Arc<dyn SandboxExec>,
}

impl ExecTool {
    pub fn new(sandbox: Arc<dyn SandboxExec>) -> Self {
        Self {
            definition: ToolDefinition::new(
                "exec",
                "Execute Command",
                "Execute a shell command in the sandbox and return its output",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Shell command to execute"
                    },
                    "timeout_ms": {
                        "type": "integer",
                        "description": "Timeout in milliseconds (default: 120000)"
                    }
                },
                "required": ["command"]
            })),
            sandbox,
        }
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _call_id: &str,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let params: ExecParams = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        let request = ExecRequest::new(&params.command, &ctx.workspace_dir)
            .with_timeout(Duration::from_millis(params.timeout_ms));

        let outcome = match self.sandbox.exec(request, &ctx.cancel).await {
            Ok(outcome) => outcome,
            Err(SandboxError::Aborted) => return Err(ToolError::Aborted),
            Err(e) => return Err(ToolError::ExecutionFailed(e.to_string())),
        };

        if outcome.timed_out {
            return Ok(ToolResult::error(format!(
                "command timed out after {}ms",
                params.timeout_ms
            )));
        }

        let mut output = String::new();
        if !outcome.stdout.is_empty() {
            output.push_str(&outcome.stdout);
        }
        if !outcome.stderr.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str("stderr:\n");
            output.push_str(&outcome.stderr);
        }
        if output.is_empty() {
            output.push_str("(no output)");
        }
        if outcome.exit_code != 0 {
            output.push_str(&format!("\n(exit code {})", outcome.exit_code));
        }

        Ok(ToolResult::text(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::LocalExec;
    use adjutant_protocols::SessionKey;

    fn ctx() -> ToolContext {
        ToolContext::new(SessionKey::new("t:dm:1"), std::env::temp_dir())
    }

    #[tokio::test]
    async fn runs_a_command() {
        let tool = ExecTool::new(Arc::new(LocalExec));
        let result = tool
            .execute("c1", serde_json::json!({"command": "echo hi"}), ctx())
            .await
            .unwrap();
        assert_eq!(result.text_content().trim(), "hi");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let tool = ExecTool::new(Arc::new(LocalExec));
        let result = tool
            .execute("c1", serde_json::json!({"command": "exit 7"}), ctx())
            .await
            .unwrap();
        assert!(result.text_content().contains("exit code 7"));
    }

    #[tokio::test]
    async fn timeout_is_an_error_result() {
        let tool = ExecTool::new(Arc::new(LocalExec));
        let result = tool
            .execute(
                "c1",
                serde_json::json!({"command": "sleep 5", "timeout_ms": 50}),
                ctx(),
            )
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.text_content().contains("timed out"));
    }
}
