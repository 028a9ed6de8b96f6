//! Tool definition metadata.

use serde::{Deserialize, Serialize};

/// Static description of a tool as exposed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name, e.g. `fs_read`.
    pub name: String,

    /// Human-readable label.
    pub label: String,

    /// Description shown to the model.
    pub description: String,

    /// JSON-schema-shaped parameter object.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_are_an_object_schema() {
        let def = ToolDefinition::new("noop", "No-op", "does nothing");
        assert_eq!(def.parameters["type"], "object");
    }
}
