//! Subagent tool.
//!
//! Spawns background reasoning sessions for the current conversation.
//! Limit refusals come back as error results; the parent decides how to
//! proceed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use adjutant_protocols::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};
use adjutant_subagents::{SpawnOutcome, SpawnRequest, SubagentSpawner, SubagentStatus};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum SubagentAction {
    Spawn {
        task: String,
        #[serde(default)]
        label: Option<String>,
    },
    List,
    Kill {
        run_id: String,
    },
}

/// Subagent bridge tool.
pub struct SubagentTool {
    definition: ToolDefinition,
    spawner: Arc<SubagentSpawner>,
}

impl SubagentTool {
    pub fn new(spawner: Arc<SubagentSpawner>) -> Self {
        Self {
            definition: ToolDefinition::new(
                "subagent",
                "Subagent",
                "Spawn a background subagent for a task, list runs, or kill one. \
                 The result is announced back into this conversation when the \
                 subagent finishes.",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["spawn", "list", "kill"],
                        "description": "What to do"
                    },
                    "task": {
                        "type": "string",
                        "description": "Task for the subagent (spawn)"
                    },
                    "label": {
                        "type": "string",
                        "description": "Short label used in announcements (spawn)"
                    },
                    "run_id": {
                        "type": "string",
                        "description": "Run to kill (kill)"
                    }
                },
                "required": ["action"]
            })),
            spawner,
        }
    }
}

#[async_trait]
impl Tool for SubagentTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _call_id: &str,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let action: SubagentAction = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        match action {
            SubagentAction::Spawn { task, label } => {
                let outcome = self
                    .spawner
                    .spawn(SpawnRequest {
                        task,
                        parent_session_key: ctx.session_key.clone(),
                        parent_channel_id: ctx.channel_id.clone(),
                        label,
                    })
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

                match outcome {
                    SpawnOutcome::Spawned { run_id, .. } => Ok(ToolResult::text(format!(
                        "spawned subagent {} (result will be announced here)",
                        run_id
                    ))),
                    SpawnOutcome::Forbidden { reason } => {
                        Ok(ToolResult::error(format!("spawn forbidden: {}", reason)))
                    }
                }
            }
            SubagentAction::List => {
                let runs = self.spawner.list().await;
                if runs.is_empty() {
                    return Ok(ToolResult::text("(no subagent runs)"));
                }
                let lines: Vec<String> = runs
                    .iter()
                    .map(|r| {
                        let status = match r.status {
                            SubagentStatus::Running => "running",
                            SubagentStatus::Ok => "ok",
                            SubagentStatus::Error => "error",
                            SubagentStatus::Killed => "killed",
                        };
                        format!("{} [{}] {}", r.run_id, status, r.display_name())
                    })
                    .collect();
                Ok(ToolResult::text(lines.join("\n")))
            }
            SubagentAction::Kill { run_id } => match self.spawner.kill(&run_id).await {
                Ok(run) => Ok(ToolResult::text(format!(
                    "killed subagent {} ('{}')",
                    run.run_id,
                    run.display_name()
                ))),
                Err(e) => Ok(ToolResult::error(e.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_protocols::SessionKey;
    use adjutant_subagents::{
        AnnounceFn, SubagentLimits, SubagentRegistry, SubagentRunner,
    };
    use tokio_util::sync::CancellationToken;

    struct QuickRunner;

    #[async_trait]
    impl SubagentRunner for QuickRunner {
        async fn run(
            &self,
            _child: SessionKey,
            task: String,
            _depth: u32,
            _cancel: CancellationToken,
        ) -> Result<String, String> {
            Ok(format!("did: {}", task))
        }
    }

    async fn tool() -> (tempfile::TempDir, SubagentTool) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            SubagentRegistry::open(dir.path().join("reg.json"))
                .await
                .unwrap(),
        );
        let announce: AnnounceFn = Arc::new(|_info| Box::pin(async {}));
        let spawner = SubagentSpawner::new(
            registry,
            Arc::new(QuickRunner),
            announce,
            SubagentLimits::default(),
        );
        (dir, SubagentTool::new(spawner))
    }

    fn ctx() -> ToolContext {
        ToolContext::new(SessionKey::new("t:dm:1"), "/tmp").with_channel("chan-1")
    }

    #[tokio::test]
    async fn spawn_and_list() {
        let (_dir, tool) = tool().await;

        let spawned = tool
            .execute(
                "c1",
                serde_json::json!({"action": "spawn", "task": "summarize inbox", "label": "inbox"}),
                ctx(),
            )
            .await
            .unwrap();
        assert!(spawned.text_content().contains("spawned subagent"));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let listed = tool
            .execute("c2", serde_json::json!({"action": "list"}), ctx())
            .await
            .unwrap();
        assert!(listed.text_content().contains("inbox"));
        assert!(listed.text_content().contains("[ok]"));
    }

    #[tokio::test]
    async fn kill_unknown_run_is_an_error_result() {
        let (_dir, tool) = tool().await;
        let result = tool
            .execute(
                "c1",
                serde_json::json!({"action": "kill", "run_id": "ghost"}),
                ctx(),
            )
            .await
            .unwrap();
        assert!(result.is_error());
    }
}
