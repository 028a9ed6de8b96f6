//! Scheduler tool.
//!
//! Lets the model create, inspect and delete scheduled jobs. Jobs
//! created here deliver to the session that created them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use adjutant_protocols::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};
use adjutant_scheduler::{JobPayload, Schedule, ScheduledJob, Scheduler};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum CronAction {
    Create {
        name: String,
        /// Standard 5-field cron expression.
        #[serde(default)]
        cron: Option<String>,
        #[serde(default)]
        tz: Option<String>,
        /// One-shot ISO-8601 instant.
        #[serde(default)]
        at: Option<DateTime<Utc>>,
        /// Fixed interval in minutes.
        #[serde(default)]
        every_minutes: Option<u64>,
        /// Message delivered as an agent turn when the job fires.
        message: String,
        #[serde(default)]
        description: Option<String>,
    },
    List,
    Delete {
        id: String,
    },
    Status {
        id: String,
    },
}

/// Scheduler bridge tool.
pub struct CronTool {
    definition: ToolDefinition,
    scheduler: Arc<Scheduler>,
}

impl CronTool {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            definition: ToolDefinition::new(
                "cron",
                "Scheduler",
                "Create, list, inspect and delete scheduled jobs. Use exactly one of \
                 'cron', 'at' or 'every_minutes' when creating.",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["create", "list", "delete", "status"],
                        "description": "What to do"
                    },
                    "name": {
                        "type": "string",
                        "description": "Job name (create)"
                    },
                    "cron": {
                        "type": "string",
                        "description": "5-field cron expression, e.g. '0 9 * * 1-5' (create)"
                    },
                    "tz": {
                        "type": "string",
                        "description": "IANA timezone for the cron expression (create)"
                    },
                    "at": {
                        "type": "string",
                        "description": "ISO-8601 instant for a one-shot job (create)"
                    },
                    "every_minutes": {
                        "type": "integer",
                        "description": "Fixed repeat interval in minutes (create)"
                    },
                    "message": {
                        "type": "string",
                        "description": "What the agent should be told when the job fires (create)"
                    },
                    "description": {
                        "type": "string",
                        "description": "What this job is for (create)"
                    },
                    "id": {
                        "type": "string",
                        "description": "Job id (delete, status)"
                    }
                },
                "required": ["action"]
            })),
            scheduler,
        }
    }
}

fn render_job(job: &ScheduledJob) -> String {
    let schedule = match &job.schedule {
        Schedule::At { time } => format!("at {}", time.to_rfc3339()),
        Schedule::Cron { expr, tz } => match tz {
            Some(tz) => format!("cron '{}' ({})", expr, tz),
            None => format!("cron '{}'", expr),
        },
        Schedule::Every { interval_ms } => format!("every {}m", interval_ms / 60_000),
    };
    let next = job
        .state
        .next_run_at_ms
        .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{} '{}' ({}) enabled={} runs={} next={}{}",
        job.id,
        job.name,
        schedule,
        job.enabled,
        job.run_count,
        next,
        job.last_error
            .as_deref()
            .map(|e| format!(" last_error={}", e))
            .unwrap_or_default(),
    )
}

#[async_trait]
impl Tool for CronTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _call_id: &str,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let action: CronAction = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        match action {
            CronAction::Create {
                name,
                cron,
                tz,
                at,
                every_minutes,
                message,
                description,
            } => {
                let schedule = match (cron, at, every_minutes) {
                    (Some(expr), None, None) => Schedule::Cron { expr, tz },
                    (None, Some(time), None) => Schedule::At { time },
                    (None, None, Some(minutes)) => Schedule::Every {
                        interval_ms: minutes.max(1) * 60_000,
                    },
                    _ => {
                        return Err(ToolError::InvalidParameters(
                            "provide exactly one of 'cron', 'at' or 'every_minutes'".to_string(),
                        ))
                    }
                };

                if let Err(e) = schedule.validate() {
                    return Ok(ToolResult::error(e.to_string()));
                }

                let mut job = ScheduledJob::new(
                    name,
                    schedule,
                    JobPayload::AgentTurn { message },
                    ctx.session_key.clone(),
                );
                if let Some(description) = description {
                    job = job.with_description(description);
                }
                let id = job.id.clone();

                self.scheduler
                    .add_job(job)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                Ok(ToolResult::text(format!("created job {}", id)))
            }
            CronAction::List => {
                let jobs = self.scheduler.list_jobs().await;
                if jobs.is_empty() {
                    return Ok(ToolResult::text("(no jobs)"));
                }
                Ok(ToolResult::text(
                    jobs.iter().map(render_job).collect::<Vec<_>>().join("\n"),
                ))
            }
            CronAction::Delete { id } => {
                let removed = self
                    .scheduler
                    .remove_job(&id)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                if removed {
                    Ok(ToolResult::text(format!("deleted job {}", id)))
                } else {
                    Ok(ToolResult::error(format!("no job with id {}", id)))
                }
            }
            CronAction::Status { id } => match self.scheduler.get_job(&id).await {
                Some(job) => Ok(ToolResult::text(render_job(&job))),
                None => Ok(ToolResult::error(format!("no job with id {}", id))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_protocols::SessionKey;
    use adjutant_scheduler::{JobStore, OnFire, SchedulerSettings};

    async fn tool() -> (tempfile::TempDir, CronTool) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            JobStore::open(dir.path().join("cron-store.json"))
                .await
                .unwrap(),
        );
        let on_fire: OnFire = Arc::new(|_job| Box::pin(async { Ok(()) }));
        let scheduler = Scheduler::new(store, SchedulerSettings::default(), on_fire);
        (dir, CronTool::new(scheduler))
    }

    fn ctx() -> ToolContext {
        ToolContext::new(SessionKey::new("t:dm:1"), "/tmp")
    }

    #[tokio::test]
    async fn create_list_delete_cycle() {
        let (_dir, tool) = tool().await;

        let created = tool
            .execute(
                "c1",
                serde_json::json!({
                    "action": "create",
                    "name": "morning-brief",
                    "cron": "0 8 * * *",
                    "message": "prepare the morning brief"
                }),
                ctx(),
            )
            .await
            .unwrap();
        let id = created.text_content().replace("created job ", "");

        let listed = tool
            .execute("c2", serde_json::json!({"action": "list"}), ctx())
            .await
            .unwrap();
        assert!(listed.text_content().contains("morning-brief"));
        assert!(listed.text_content().contains("cron '0 8 * * *'"));

        let status = tool
            .execute("c3", serde_json::json!({"action": "status", "id": id}), ctx())
            .await
            .unwrap();
        assert!(status.text_content().contains("enabled=true"));

        let deleted = tool
            .execute("c4", serde_json::json!({"action": "delete", "id": id}), ctx())
            .await
            .unwrap();
        assert!(deleted.text_content().starts_with("deleted"));
    }

    #[tokio::test]
    async fn create_requires_exactly_one_schedule() {
        let (_dir, tool) = tool().await;
        let result = tool
            .execute(
                "c1",
                serde_json::json!({
                    "action": "create",
                    "name": "confused",
                    "cron": "0 8 * * *",
                    "every_minutes": 5,
                    "message": "hm"
                }),
                ctx(),
            )
            .await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn bad_cron_expression_is_an_error_result() {
        let (_dir, tool) = tool().await;
        let result = tool
            .execute(
                "c1",
                serde_json::json!({
                    "action": "create",
                    "name": "broken",
                    "cron": "whenever",
                    "message": "hm"
                }),
                ctx(),
            )
            .await
            .unwrap();
        assert!(result.is_error());
    }
}
