//! Tool execution context.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::types::SessionKey;

/// Per-call context handed to every tool execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Session the call belongs to.
    pub session_key: SessionKey,

    /// Channel the triggering message arrived on; empty for synthesized
    /// turns.
    pub channel_id: String,

    /// Workspace root for file-touching tools.
    pub workspace_dir: PathBuf,

    /// Cancellation propagated from the owning session run. Tools that
    /// start subprocesses or HTTP requests must honor it.
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(session_key: SessionKey, workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_key,
            channel_id: String::new(),
            workspace_dir: workspace_dir.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
