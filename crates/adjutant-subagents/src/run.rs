//! Subagent run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use adjutant_protocols::SessionKey;

/// Status of a subagent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Running,
    Ok,
    Error,
    Killed,
}

impl SubagentStatus {
    pub fn is_terminal(self) -> bool {
        self != SubagentStatus::Running
    }
}

/// One durable subagent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentRun {
    pub run_id: String,
    pub child_session_key: SessionKey,
    pub parent_session_key: SessionKey,
    pub parent_channel_id: String,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub depth: u32,
    pub status: SubagentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SubagentRun {
    /// Display name for announces: the label when present, otherwise a
    /// truncated task.
    pub fn display_name(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        if self.task.len() <= 60 {
            self.task.clone()
        } else {
            let mut end = 60;
            while end > 0 && !self.task.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &self.task[..end])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SubagentStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&SubagentStatus::Killed).unwrap(),
            "\"killed\""
        );
    }

    #[test]
    fn display_name_prefers_label() {
        let run = SubagentRun {
            run_id: "r".into(),
            child_session_key: SessionKey::for_subagent("r"),
            parent_session_key: SessionKey::new("t:dm:1"),
            parent_channel_id: "c".into(),
            task: "a very long task ".repeat(20),
            label: Some("research".into()),
            depth: 1,
            status: SubagentStatus::Running,
            result: None,
            error: None,
            created_at: Utc::now(),
            ended_at: None,
        };
        assert_eq!(run.display_name(), "research");

        let unlabeled = SubagentRun {
            label: None,
            ..run
        };
        assert!(unlabeled.display_name().len() <= 63);
        assert!(unlabeled.display_name().ends_with("..."));
    }
}
