//! Tool registry.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use adjutant_protocols::{Tool, ToolDefinition};

/// Registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        debug!(tool = %name, "registered tool");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| t.clone())
    }

    /// Definitions of all registered tools, sorted by name for stable
    /// prompt assembly.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .iter()
            .map(|t| t.definition().clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_protocols::{ToolContext, ToolError, ToolResult};
    use async_trait::async_trait;

    struct NoopTool {
        definition: ToolDefinition,
    }

    #[async_trait]
    impl Tool for NoopTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn execute(
            &self,
            _call_id: &str,
            _params: serde_json::Value,
            _ctx: ToolContext,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::text("ok"))
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(NoopTool {
            definition: ToolDefinition::new("b_tool", "B", "second"),
        }));
        registry.register(Arc::new(NoopTool {
            definition: ToolDefinition::new("a_tool", "A", "first"),
        }));

        assert!(registry.get("a_tool").is_some());
        assert!(registry.get("missing").is_none());

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a_tool", "b_tool"]);
    }
}
