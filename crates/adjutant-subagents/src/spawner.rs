//! Subagent spawner.
//!
//! Validates limits, registers the run, and drives the child session in
//! a background task through an injected [`SubagentRunner`]. Completion
//! is announced to the parent via a callback; the spawner itself never
//! touches parent session state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use adjutant_protocols::SessionKey;
use async_trait::async_trait;

use crate::error::SubagentError;
use crate::registry::SubagentRegistry;
use crate::run::{SubagentRun, SubagentStatus};

/// Fan-out limits.
#[derive(Debug, Clone)]
pub struct SubagentLimits {
    pub max_depth: u32,
    pub max_children_per_session: usize,
    pub max_concurrent_total: usize,
}

impl Default for SubagentLimits {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_children_per_session: 5,
            max_concurrent_total: 10,
        }
    }
}

/// Executes one child session to completion. Implemented by the runtime
/// so this crate stays free of the orchestrator dependency.
#[async_trait]
pub trait SubagentRunner: Send + Sync {
    /// Run the child and return its final response text.
    async fn run(
        &self,
        child_session_key: SessionKey,
        task: String,
        depth: u32,
        cancel: CancellationToken,
    ) -> Result<String, String>;
}

/// Everything the announce callback needs to notify the parent.
#[derive(Debug, Clone)]
pub struct AnnounceInfo {
    pub run: SubagentRun,
    pub duration: Duration,
    pub remaining_active_children: usize,
}

impl AnnounceInfo {
    /// Bounded summary injected into the parent session.
    pub fn summary(&self) -> String {
        let status = match self.run.status {
            SubagentStatus::Ok => "ok",
            SubagentStatus::Error => "error",
            SubagentStatus::Killed => "killed",
            SubagentStatus::Running => "running",
        };

        let mut result = self.run.result.clone().unwrap_or_default();
        const MAX_RESULT_CHARS: usize = 2000;
        if result.len() > MAX_RESULT_CHARS {
            let mut end = MAX_RESULT_CHARS;
            while end > 0 && !result.is_char_boundary(end) {
                end -= 1;
            }
            result.truncate(end);
            result.push_str("...");
        }

        format!(
            "Subagent '{}' finished with status {} after {:.1}s.\nResult:\n{}\n({} subagents still running for this session)",
            self.run.display_name(),
            status,
            self.duration.as_secs_f64(),
            result,
            self.remaining_active_children,
        )
    }
}

/// Callback fired after each completed run.
pub type AnnounceFn = Arc<dyn Fn(AnnounceInfo) -> BoxFuture<'static, ()> + Send + Sync>;

/// A spawn request from the parent session.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub task: String,
    pub parent_session_key: SessionKey,
    pub parent_channel_id: String,
    pub label: Option<String>,
}

/// Outcome of a spawn attempt. Limit violations are ordinary outcomes,
/// not errors.
#[derive(Debug, Clone)]
pub enum SpawnOutcome {
    Spawned {
        run_id: String,
        child_session_key: SessionKey,
    },
    Forbidden {
        reason: String,
    },
}

/// The spawner.
pub struct SubagentSpawner {
    registry: Arc<SubagentRegistry>,
    runner: Arc<dyn SubagentRunner>,
    announce: AnnounceFn,
    limits: SubagentLimits,
    kill_tokens: DashMap<String, CancellationToken>,
}

impl SubagentSpawner {
    pub fn new(
        registry: Arc<SubagentRegistry>,
        runner: Arc<dyn SubagentRunner>,
        announce: AnnounceFn,
        limits: SubagentLimits,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            runner,
            announce,
            limits,
            kill_tokens: DashMap::new(),
        })
    }

    /// Spawn a child session. Returns immediately; the run proceeds in
    /// the background and announces on completion.
    pub async fn spawn(self: &Arc<Self>, request: SpawnRequest) -> Result<SpawnOutcome, SubagentError> {
        let parent_depth = self.registry.depth_of(&request.parent_session_key).await;
        let child_depth = parent_depth + 1;

        if child_depth > self.limits.max_depth {
            return Ok(SpawnOutcome::Forbidden {
                reason: format!(
                    "depth limit reached ({} > {})",
                    child_depth, self.limits.max_depth
                ),
            });
        }

        let active_children = self
            .registry
            .active_children(&request.parent_session_key)
            .await;
        if active_children >= self.limits.max_children_per_session {
            return Ok(SpawnOutcome::Forbidden {
                reason: format!(
                    "session already has {} active subagents (limit {})",
                    active_children, self.limits.max_children_per_session
                ),
            });
        }

        let active_total = self.registry.active_total().await;
        if active_total >= self.limits.max_concurrent_total {
            return Ok(SpawnOutcome::Forbidden {
                reason: format!(
                    "{} subagents already running (global limit {})",
                    active_total, self.limits.max_concurrent_total
                ),
            });
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let child_session_key = SessionKey::for_subagent(&run_id);

        let run = SubagentRun {
            run_id: run_id.clone(),
            child_session_key: child_session_key.clone(),
            parent_session_key: request.parent_session_key.clone(),
            parent_channel_id: request.parent_channel_id.clone(),
            task: request.task.clone(),
            label: request.label.clone(),
            depth: child_depth,
            status: SubagentStatus::Running,
            result: None,
            error: None,
            created_at: Utc::now(),
            ended_at: None,
        };
        self.registry.insert(run).await?;

        let cancel = CancellationToken::new();
        self.kill_tokens.insert(run_id.clone(), cancel.clone());

        let this = Arc::clone(self);
        let task = request.task;
        let child_key = child_session_key.clone();
        let id = run_id.clone();
        tokio::spawn(async move {
            this.drive_child(id, child_key, task, child_depth, cancel).await;
        });

        info!(run = %run_id, depth = child_depth, "spawned subagent");
        Ok(SpawnOutcome::Spawned {
            run_id,
            child_session_key,
        })
    }

    /// Kill a running subagent: abort the underlying session and record
    /// the transition.
    pub async fn kill(&self, run_id: &str) -> Result<SubagentRun, SubagentError> {
        if let Some((_, token)) = self.kill_tokens.remove(run_id) {
            token.cancel();
        }
        let run = self.registry.mark_killed(run_id).await?;
        info!(run = %run_id, "killed subagent");
        Ok(run)
    }

    pub async fn list(&self) -> Vec<SubagentRun> {
        self.registry.list().await
    }

    async fn drive_child(
        &self,
        run_id: String,
        child_session_key: SessionKey,
        task: String,
        depth: u32,
        cancel: CancellationToken,
    ) {
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(run = %run_id, "subagent cancelled");
                self.kill_tokens.remove(&run_id);
                return;
            }
            outcome = self.runner.run(child_session_key, task, depth, cancel.clone()) => outcome,
        };

        self.kill_tokens.remove(&run_id);

        // A kill that landed while the runner was unwinding owns the
        // record; do not overwrite it or announce.
        if cancel.is_cancelled() {
            debug!(run = %run_id, "subagent finished after kill; dropping outcome");
            return;
        }

        let completed = match self.registry.mark_complete(&run_id, outcome).await {
            Ok(run) => run,
            Err(e) => {
                // The run was killed (and possibly pruned) while finishing.
                warn!(run = %run_id, "could not record completion: {}", e);
                return;
            }
        };

        let remaining = self
            .registry
            .active_children(&completed.parent_session_key)
            .await;
        let info = AnnounceInfo {
            run: completed,
            duration: started.elapsed(),
            remaining_active_children: remaining,
        };
        (self.announce)(info).await;
    }
}

#[cfg(test)]
#[path = "spawner_tests.rs"]
mod tests;
