//! Structured memory tool.
//!
//! The only mutator of the structured memory store. The `action` field
//! maps to a tagged variant; unknown actions fail schema validation and
//! come back to the model as error results.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use adjutant_memory::{MemoryEntry, MemoryStore};
use adjutant_protocols::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum MemoryAction {
    Store {
        content: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    Search {
        query: String,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    List,
    Delete {
        id: String,
    },
    Update {
        id: String,
        content: String,
        #[serde(default)]
        tags: Option<Vec<String>>,
    },
}

fn default_limit() -> usize {
    10
}

/// Memory tool over the structured store.
pub struct MemoryTool {
    definition: ToolDefinition,
    store: Arc<MemoryStore>,
}

impl MemoryTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            definition: ToolDefinition::new(
                "memory",
                "Memory",
                "Store, search, list, update and delete long-term memory entries",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["store", "search", "list", "delete", "update"],
                        "description": "What to do"
                    },
                    "content": {
                        "type": "string",
                        "description": "Entry content (store, update)"
                    },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Entry tags (store, update)"
                    },
                    "query": {
                        "type": "string",
                        "description": "Search query (search)"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Max search results (default: 10)"
                    },
                    "id": {
                        "type": "string",
                        "description": "Entry id (delete, update)"
                    }
                },
                "required": ["action"]
            })),
            store,
        }
    }
}

fn render(entries: &[MemoryEntry]) -> String {
    if entries.is_empty() {
        return "(no entries)".to_string();
    }
    entries
        .iter()
        .map(|e| {
            let tags = if e.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", e.tags.join(", "))
            };
            format!("{}{}: {}", e.id, tags, e.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for MemoryTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _call_id: &str,
        params: serde_json::Value,
        _ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let action: MemoryAction = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        let text = match action {
            MemoryAction::Store { content, tags } => {
                let entry = self
                    .store
                    .store(content, tags)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                format!("stored as {}", entry.id)
            }
            MemoryAction::Search { query, limit } => {
                render(&self.store.search(&query, limit).await)
            }
            MemoryAction::List => render(&self.store.list().await),
            MemoryAction::Delete { id } => {
                let removed = self
                    .store
                    .delete(&id)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                if removed {
                    format!("deleted {}", id)
                } else {
                    format!("no entry with id {}", id)
                }
            }
            MemoryAction::Update { id, content, tags } => {
                let entry = self
                    .store
                    .update(&id, content, tags)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                format!("updated {}", entry.id)
            }
        };

        Ok(ToolResult::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_protocols::SessionKey;

    async fn tool() -> (tempfile::TempDir, MemoryTool) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            MemoryStore::open(dir.path().join("memory.json"))
                .await
                .unwrap(),
        );
        (dir, MemoryTool::new(store))
    }

    fn ctx() -> ToolContext {
        ToolContext::new(SessionKey::new("t:dm:1"), "/tmp")
    }

    #[tokio::test]
    async fn store_search_delete_cycle() {
        let (_dir, tool) = tool().await;

        let stored = tool
            .execute(
                "c1",
                serde_json::json!({"action": "store", "content": "likes rye bread", "tags": ["food"]}),
                ctx(),
            )
            .await
            .unwrap();
        let id = stored.text_content().replace("stored as ", "");

        let found = tool
            .execute(
                "c2",
                serde_json::json!({"action": "search", "query": "rye"}),
                ctx(),
            )
            .await
            .unwrap();
        assert!(found.text_content().contains("likes rye bread"));

        let deleted = tool
            .execute("c3", serde_json::json!({"action": "delete", "id": id}), ctx())
            .await
            .unwrap();
        assert!(deleted.text_content().starts_with("deleted"));

        let listed = tool
            .execute("c4", serde_json::json!({"action": "list"}), ctx())
            .await
            .unwrap();
        assert_eq!(listed.text_content(), "(no entries)");
    }

    #[tokio::test]
    async fn unknown_action_is_invalid_parameters() {
        let (_dir, tool) = tool().await;
        let result = tool
            .execute("c1", serde_json::json!({"action": "explode"}), ctx())
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));
    }
}
