//! Session messages: the ordered turn log of a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::ContentBlock;

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Carrier of tool results answering the preceding assistant turn.
    Tool,
}

/// One persisted turn in a session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,

    pub content: Vec<ContentBlock>,

    /// Why the model stopped, on assistant turns ("end_turn", "tool_use",
    /// "error", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Error detail when `stop_reason` is "error".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Originating user id; synthetic turns (subagent announces) use
    /// "system".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl SessionMessage {
    fn with_role(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            stop_reason: None,
            error_message: None,
            sender: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a user message from plain text.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, vec![ContentBlock::text(text)])
    }

    /// Create a user message with explicit blocks.
    pub fn user_blocks(content: Vec<ContentBlock>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create an assistant message from plain text.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// Create an assistant message with explicit blocks.
    pub fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a system-framed message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, vec![ContentBlock::text(text)])
    }

    /// Create a tool message carrying result blocks.
    pub fn tool_results(content: Vec<ContentBlock>) -> Self {
        Self::with_role(Role::Tool, content)
    }

    /// Set the sender id.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Ids of all `tool_use` blocks in this message.
    pub fn tool_use_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Ids referenced by `tool_result` blocks in this message.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All top-level image blocks.
    pub fn images(&self) -> Vec<&ContentBlock> {
        self.content.iter().filter(|b| b.is_image()).collect()
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    /// Approximate character count of the message, counting nested
    /// tool-result text. Used for token estimation.
    pub fn char_count(&self) -> usize {
        fn blocks_chars(blocks: &[ContentBlock]) -> usize {
            blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => text.len(),
                    ContentBlock::Image { data, .. } => data.len() / 100,
                    ContentBlock::ToolUse { input, .. } => input.to_string().len(),
                    ContentBlock::ToolResult { content, .. } => blocks_chars(content),
                })
                .sum()
        }
        blocks_chars(&self.content)
    }
}
