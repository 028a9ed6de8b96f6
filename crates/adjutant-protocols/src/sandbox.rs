//! Sandboxed command execution primitive.
//!
//! Container lifecycle is out of scope; the runtime sees only this
//! opaque `exec` surface. Implementations cap each output stream at
//! [`MAX_STREAM_CHARS`] and must honor cancellation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SandboxError;

/// Cap applied to stdout and stderr, each.
pub const MAX_STREAM_CHARS: usize = 50_000;

/// One command to run.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub command: String,
    pub workdir: PathBuf,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            workdir: workdir.into(),
            env: HashMap::new(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of a finished (or timed-out) command.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

/// Core trait for sandboxed execution backends.
#[async_trait]
pub trait SandboxExec: Send + Sync {
    async fn exec(
        &self,
        request: ExecRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome, SandboxError>;
}
