//! Bridges the subagent spawner to the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use adjutant_protocols::{InboundMessage, SessionKey};
use adjutant_subagents::SubagentRunner;

use crate::orchestrator::{Orchestrator, STOPPED_RESPONSE};
use crate::prompt::subagent_suffix;

/// Runs subagent child sessions through the orchestrator with the
/// subagent prompt suffix. Kill tokens translate into orchestrator
/// cancellation.
pub struct OrchestratorRunner {
    orchestrator: Arc<Orchestrator>,
    max_depth: u32,
}

impl OrchestratorRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, max_depth: u32) -> Self {
        Self {
            orchestrator,
            max_depth,
        }
    }
}

#[async_trait]
impl SubagentRunner for OrchestratorRunner {
    async fn run(
        &self,
        child_session_key: SessionKey,
        task: String,
        depth: u32,
        cancel: CancellationToken,
    ) -> Result<String, String> {
        let inbound = InboundMessage {
            text: task,
            session_key: child_session_key.clone(),
            channel_id: String::new(),
            user_id: "system".to_string(),
            user_name: None,
            is_group: false,
            images: Vec::new(),
        };

        // Translate a kill into cancellation of the child's run.
        let orchestrator = self.orchestrator.clone();
        let watched_key = child_session_key.clone();
        let watcher_cancel = cancel.clone();
        let watcher = tokio::spawn(async move {
            watcher_cancel.cancelled().await;
            debug!(session = %watched_key, "kill requested; cancelling child run");
            orchestrator.cancel(&watched_key);
        });

        let result = self
            .orchestrator
            .handle_message_with(inbound, Some(subagent_suffix(depth, self.max_depth)))
            .await;
        watcher.abort();

        match result {
            Some(out) if cancel.is_cancelled() && out.text == STOPPED_RESPONSE => {
                Err("killed".to_string())
            }
            Some(out) => Ok(out.text),
            None => Err("subagent produced no response".to_string()),
        }
    }
}
