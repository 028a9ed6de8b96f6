//! HTTP model client.
//!
//! Maps the runtime's message shape onto a messages-style completion
//! endpoint. The wire format mirrors the Anthropic Messages API; only
//! the pieces the runtime uses are modeled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use adjutant_protocols::{
    ContentBlock, ModelClient, ModelError, ModelRequest, ModelResponse, Role, SessionMessage,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Reqwest-backed model client.
pub struct HttpModelClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpModelClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn build_body(&self, request: &ModelRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> =
            request.messages.iter().map(wire_message).collect();

        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "system": request.system_prompt,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(tools);
        }
        body
    }
}

/// Map one session message onto the wire. System-framed turns (flush
/// notes, compaction summaries) ride along as user messages so the
/// endpoint sees a two-role log.
fn wire_message(message: &SessionMessage) -> serde_json::Value {
    let role = match message.role {
        Role::Assistant => "assistant",
        _ => "user",
    };

    let content: Vec<serde_json::Value> = message
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => json!({"type": "text", "text": text}),
            ContentBlock::Image { data, mime_type } => json!({
                "type": "image",
                "source": {"type": "base64", "media_type": mime_type, "data": data},
            }),
            ContentBlock::ToolUse { id, name, input } => json!({
                "type": "tool_use", "id": id, "name": name, "input": input,
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let inner: Vec<serde_json::Value> = content
                    .iter()
                    .map(|b| match b {
                        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
                        ContentBlock::Image { data, mime_type } => json!({
                            "type": "image",
                            "source": {"type": "base64", "media_type": mime_type, "data": data},
                        }),
                        other => json!({"type": "text", "text": format!("{:?}", other)}),
                    })
                    .collect();
                json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": inner,
                    "is_error": is_error,
                })
            }
        })
        .collect();

    json!({"role": role, "content": content})
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, ModelError> {
        let body = self.build_body(&request);
        debug!(model = %self.model, messages = request.messages.len(), "model call");

        let send = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ModelError::Aborted),
            response = send => response,
        };

        let response = response.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout
            } else {
                ModelError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let wire: WireResponse =
            serde_json::from_str(&text).map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let mut blocks = Vec::new();
        for block in wire.content {
            match block {
                WireBlock::Text { text } => blocks.push(ContentBlock::text(text)),
                WireBlock::ToolUse { id, name, input } => {
                    blocks.push(ContentBlock::ToolUse { id, name, input })
                }
                WireBlock::Unknown => {}
            }
        }
        if blocks.is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        let mut message = SessionMessage::assistant_blocks(blocks);
        message.stop_reason = wire.stop_reason;
        Ok(ModelResponse { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_protocols::ToolDefinition;

    #[test]
    fn body_carries_system_tools_and_messages() {
        let client = HttpModelClient::new("sk-test", "some-model");
        let request = ModelRequest::new(
            "be useful",
            vec![
                SessionMessage::user("hi"),
                SessionMessage::assistant("hello"),
            ],
        )
        .with_tools(vec![ToolDefinition::new("echo", "Echo", "echoes")]);

        let body = client.build_body(&request);
        assert_eq!(body["system"], "be useful");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["tools"][0]["name"], "echo");
    }

    #[test]
    fn tool_results_ride_as_user_content() {
        let message = SessionMessage::tool_results(vec![ContentBlock::tool_result(
            "call_1",
            vec![ContentBlock::text("output")],
        )]);
        let wire = wire_message(&message);
        assert_eq!(wire["role"], "user");
        assert_eq!(wire["content"][0]["type"], "tool_result");
        assert_eq!(wire["content"][0]["tool_use_id"], "call_1");
    }

    #[test]
    fn injected_system_turns_become_user_messages() {
        let client = HttpModelClient::new("k", "m");
        let request = ModelRequest::new(
            "sys",
            vec![SessionMessage::system("flush note").with_sender("system")],
        );
        let body = client.build_body(&request);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn unknown_wire_blocks_are_skipped() {
        let wire: WireResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"hi"},{"type":"thinking","thinking":"..."}],"stop_reason":"end_turn"}"#,
        )
        .unwrap();
        assert_eq!(wire.content.len(), 2);
        assert!(matches!(wire.content[1], WireBlock::Unknown));
    }
}
