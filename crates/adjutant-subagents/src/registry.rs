//! Durable subagent registry (`subagent-registry.json`).
//!
//! Holds every known run. On load, `running` records left behind by a
//! dead process are rewritten as `error` before any new spawn can
//! happen. Persistence keeps the most recent 100 entries.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use adjutant_protocols::SessionKey;

use crate::error::SubagentError;
use crate::run::{SubagentRun, SubagentStatus};

/// Entries kept on disk.
const MAX_PERSISTED: usize = 100;

/// Completed runs older than this are eligible for cleanup.
const CLEANUP_AGE_SECS: i64 = 3600;

pub struct SubagentRegistry {
    path: PathBuf,
    runs: RwLock<Vec<SubagentRun>>,
}

impl SubagentRegistry {
    /// Open the registry and apply process-restart safety: any persisted
    /// `running` record is rewritten as `error`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SubagentError> {
        let path = path.as_ref().to_path_buf();

        let mut runs = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Vec<SubagentRun>>(&content) {
                Ok(runs) => runs,
                Err(e) => {
                    warn!("Corrupt subagent registry at {:?}, starting fresh: {}", path, e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut rewritten = 0;
        for run in runs.iter_mut() {
            if run.status == SubagentStatus::Running {
                run.status = SubagentStatus::Error;
                run.error = Some("process restart".to_string());
                run.result = Some("process restart".to_string());
                run.ended_at = Some(Utc::now());
                rewritten += 1;
            }
        }

        let registry = Self {
            path,
            runs: RwLock::new(runs),
        };

        if rewritten > 0 {
            info!("Rewrote {} stale running subagent records", rewritten);
            let runs = registry.runs.read().await;
            registry.persist(&runs).await?;
        }

        Ok(registry)
    }

    /// Depth of a session: a session whose key appears as some run's
    /// child inherits that run's depth; top-level sessions are depth 0.
    pub async fn depth_of(&self, session_key: &SessionKey) -> u32 {
        self.runs
            .read()
            .await
            .iter()
            .filter(|r| &r.child_session_key == session_key)
            .map(|r| r.depth)
            .max()
            .unwrap_or(0)
    }

    /// Running children of the given parent.
    pub async fn active_children(&self, parent: &SessionKey) -> usize {
        self.runs
            .read()
            .await
            .iter()
            .filter(|r| r.status == SubagentStatus::Running && &r.parent_session_key == parent)
            .count()
    }

    /// Running runs across all parents.
    pub async fn active_total(&self) -> usize {
        self.runs
            .read()
            .await
            .iter()
            .filter(|r| r.status == SubagentStatus::Running)
            .count()
    }

    pub async fn insert(&self, run: SubagentRun) -> Result<(), SubagentError> {
        let mut runs = self.runs.write().await;
        runs.push(run);
        self.persist(&runs).await
    }

    pub async fn get(&self, run_id: &str) -> Option<SubagentRun> {
        self.runs
            .read()
            .await
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<SubagentRun> {
        self.runs.read().await.clone()
    }

    /// Terminate a run with the given outcome. `Ok` carries the result
    /// text, `Err` the failure reason; both leave `result` non-null.
    pub async fn mark_complete(
        &self,
        run_id: &str,
        outcome: Result<String, String>,
    ) -> Result<SubagentRun, SubagentError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| SubagentError::NotFound(run_id.to_string()))?;

        match outcome {
            Ok(result) => {
                run.status = SubagentStatus::Ok;
                run.result = Some(result);
                run.error = None;
            }
            Err(reason) => {
                run.status = SubagentStatus::Error;
                run.result = Some(reason.clone());
                run.error = Some(reason);
            }
        }
        run.ended_at = Some(Utc::now());
        let updated = run.clone();

        self.persist(&runs).await?;
        Ok(updated)
    }

    /// Transition `running -> killed`.
    pub async fn mark_killed(&self, run_id: &str) -> Result<SubagentRun, SubagentError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| SubagentError::NotFound(run_id.to_string()))?;

        run.status = SubagentStatus::Killed;
        run.ended_at = Some(Utc::now());
        let updated = run.clone();

        self.persist(&runs).await?;
        Ok(updated)
    }

    /// Drop completed runs older than one hour.
    pub async fn cleanup(&self) -> Result<usize, SubagentError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(CLEANUP_AGE_SECS);
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|r| {
            !(r.status.is_terminal() && r.ended_at.map(|t| t < cutoff).unwrap_or(false))
        });
        let removed = before - runs.len();

        if removed > 0 {
            debug!("Cleaned up {} old subagent runs", removed);
            self.persist(&runs).await?;
        }
        Ok(removed)
    }

    /// Atomic tmp-write + rename; only the newest [`MAX_PERSISTED`]
    /// entries are serialized.
    async fn persist(&self, runs: &[SubagentRun]) -> Result<(), SubagentError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let start = runs.len().saturating_sub(MAX_PERSISTED);
        let json = serde_json::to_string_pretty(&runs[start..])?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
