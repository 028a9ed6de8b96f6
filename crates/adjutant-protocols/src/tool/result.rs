//! Tool execution results.

use serde::{Deserialize, Serialize};

use crate::types::ContentBlock;

/// Result of a tool execution: an ordered list of text/image blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
}

impl ToolResult {
    /// Result with a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Result with explicit blocks.
    pub fn blocks(content: Vec<ContentBlock>) -> Self {
        Self { content }
    }

    /// Error result surfaced to the model as a text block.
    ///
    /// Tool failures never crash the run; the model sees `Error: ...`
    /// and can self-correct.
    pub fn error(message: impl AsRef<str>) -> Self {
        Self {
            content: vec![ContentBlock::text(format!("Error: {}", message.as_ref()))],
        }
    }

    /// Concatenated text of all text blocks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_error(&self) -> bool {
        self.text_content().starts_with("Error:")
    }
}
