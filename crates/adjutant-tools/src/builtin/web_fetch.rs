//! Web fetch tool.
//!
//! Raw GET with a bounded timeout; body extraction beyond text is out of
//! scope. Oversized bodies are cut by the result pipeline.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use adjutant_protocols::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

#[derive(Debug, Deserialize)]
struct WebFetchParams {
    url: String,
    /// Timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Fetch a URL and return its body as text.
pub struct WebFetchTool {
    definition: ToolDefinition,
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition::new(
                "web_fetch",
                "Fetch URL",
                "Fetch a URL over HTTP(S) and return the response body",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The http(s) URL to fetch"
                    },
                    "timeout_secs": {
                        "type": "integer",
                        "description": "Timeout in seconds (default: 30)"
                    }
                },
                "required": ["url"]
            })),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _call_id: &str,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let params: WebFetchParams = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        if !params.url.starts_with("http://") && !params.url.starts_with("https://") {
            return Err(ToolError::InvalidParameters(
                "url must be http(s)".to_string(),
            ));
        }

        let request = self
            .client
            .get(&params.url)
            .timeout(Duration::from_secs(params.timeout_secs.clamp(1, 120)))
            .send();

        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(ToolError::Aborted),
            response = request => {
                response.map_err(|e| ToolError::ExecutionFailed(e.to_string()))?
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        Ok(ToolResult::text(format!(
            "HTTP {}\n\n{}",
            status.as_u16(),
            body
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_protocols::SessionKey;

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let tool = WebFetchTool::new();
        let ctx = ToolContext::new(SessionKey::new("t:dm:1"), "/tmp");
        let result = tool
            .execute("c1", serde_json::json!({"url": "ftp://files"}), ctx)
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));
    }
}
