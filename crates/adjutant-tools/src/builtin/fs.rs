//! Workspace file tools.
//!
//! Paths are resolved relative to the workspace directory; anything that
//! escapes it is rejected.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use adjutant_protocols::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

/// Resolve a user-supplied path inside the workspace.
fn resolve(workspace: &Path, relative: &str) -> Result<PathBuf, ToolError> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return Err(ToolError::InvalidParameters(
            "path must be workspace-relative".to_string(),
        ));
    }
    for component in candidate.components() {
        if matches!(component, Component::ParentDir) {
            return Err(ToolError::InvalidParameters(
                "path may not contain '..'".to_string(),
            ));
        }
    }
    Ok(workspace.join(candidate))
}

// ---------------------------------------------------------------------------
// fs_read

#[derive(Debug, Deserialize)]
struct FsReadParams {
    path: String,
}

/// Read a workspace file.
pub struct FsReadTool {
    definition: ToolDefinition,
}

impl FsReadTool {
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition::new(
                "fs_read",
                "Read File",
                "Read a text file from the workspace",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Workspace-relative file path"
                    }
                },
                "required": ["path"]
            })),
        }
    }
}

impl Default for FsReadTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FsReadTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _call_id: &str,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let params: FsReadParams = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        let path = resolve(&ctx.workspace_dir, &params.path)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{}: {}", params.path, e)))?;
        Ok(ToolResult::text(content))
    }
}

// ---------------------------------------------------------------------------
// fs_write

#[derive(Debug, Deserialize)]
struct FsWriteParams {
    path: String,
    content: String,
}

/// Write a workspace file, creating parent directories.
pub struct FsWriteTool {
    definition: ToolDefinition,
}

impl FsWriteTool {
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition::new(
                "fs_write",
                "Write File",
                "Write a text file in the workspace, creating directories as needed",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Workspace-relative file path"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full file content"
                    }
                },
                "required": ["path", "content"]
            })),
        }
    }
}

impl Default for FsWriteTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FsWriteTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _call_id: &str,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let params: FsWriteParams = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        let path = resolve(&ctx.workspace_dir, &params.path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &params.content).await?;
        Ok(ToolResult::text(format!(
            "wrote {} bytes to {}",
            params.content.len(),
            params.path
        )))
    }
}

// ---------------------------------------------------------------------------
// fs_list

#[derive(Debug, Deserialize)]
struct FsListParams {
    #[serde(default)]
    path: Option<String>,
}

/// List a workspace directory.
pub struct FsListTool {
    definition: ToolDefinition,
}

impl FsListTool {
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition::new(
                "fs_list",
                "List Directory",
                "List files in a workspace directory",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Workspace-relative directory (default: workspace root)"
                    }
                }
            })),
        }
    }
}

impl Default for FsListTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FsListTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _call_id: &str,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let params: FsListParams = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        let dir = match params.path.as_deref() {
            Some(p) => resolve(&ctx.workspace_dir, p)?,
            None => ctx.workspace_dir.clone(),
        };

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        while let Some(entry) = entries.next_entry().await? {
            let suffix = if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                "/"
            } else {
                ""
            };
            names.push(format!("{}{}", entry.file_name().to_string_lossy(), suffix));
        }
        names.sort();

        Ok(ToolResult::text(if names.is_empty() {
            "(empty)".to_string()
        } else {
            names.join("\n")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_protocols::SessionKey;

    fn ctx(dir: &Path) -> ToolContext {
        ToolContext::new(SessionKey::new("t:dm:1"), dir)
    }

    #[tokio::test]
    async fn write_then_read_then_list() {
        let dir = tempfile::tempdir().unwrap();

        FsWriteTool::new()
            .execute(
                "c1",
                serde_json::json!({"path": "notes/todo.md", "content": "buy milk"}),
                ctx(dir.path()),
            )
            .await
            .unwrap();

        let read = FsReadTool::new()
            .execute(
                "c2",
                serde_json::json!({"path": "notes/todo.md"}),
                ctx(dir.path()),
            )
            .await
            .unwrap();
        assert_eq!(read.text_content(), "buy milk");

        let listed = FsListTool::new()
            .execute("c3", serde_json::json!({}), ctx(dir.path()))
            .await
            .unwrap();
        assert_eq!(listed.text_content(), "notes/");
    }

    #[tokio::test]
    async fn escapes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let result = FsReadTool::new()
            .execute(
                "c1",
                serde_json::json!({"path": "../secrets"}),
                ctx(dir.path()),
            )
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));

        let result = FsReadTool::new()
            .execute(
                "c1",
                serde_json::json!({"path": "/etc/passwd"}),
                ctx(dir.path()),
            )
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn missing_file_is_an_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FsReadTool::new()
            .execute("c1", serde_json::json!({"path": "nope.txt"}), ctx(dir.path()))
            .await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed(_))));
    }
}
