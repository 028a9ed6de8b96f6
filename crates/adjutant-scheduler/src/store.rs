//! Durable job store (`cron-store.json`).
//!
//! Store version 2. v1 records carry no `state` object and migrate on
//! load by defaulting `consecutive_failures = 0`; anything with a
//! `state` field is treated as v2.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::job::ScheduledJob;

const STORE_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    jobs: Vec<ScheduledJob>,
}

/// File-backed job store with an in-memory working copy.
pub struct JobStore {
    path: PathBuf,
    jobs: RwLock<Vec<ScheduledJob>>,
}

impl JobStore {
    /// Open the store, migrating v1 records as needed. An unreadable
    /// file is logged and treated as empty.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();

        let jobs = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<StoreFile>(&content) {
                Ok(file) => {
                    if file.version < STORE_VERSION {
                        info!(
                            "Migrating cron store v{} -> v{} ({} jobs)",
                            file.version,
                            STORE_VERSION,
                            file.jobs.len()
                        );
                    }
                    file.jobs
                }
                Err(e) => {
                    warn!("Corrupt cron store at {:?}, starting fresh: {}", path, e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Loaded {} scheduled jobs from {:?}", jobs.len(), path);
        Ok(Self {
            path,
            jobs: RwLock::new(jobs),
        })
    }

    pub async fn list(&self) -> Vec<ScheduledJob> {
        self.jobs.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ScheduledJob> {
        self.jobs.read().await.iter().find(|j| j.id == id).cloned()
    }

    /// Insert a new job and persist.
    pub async fn add(&self, job: ScheduledJob) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.write().await;
        jobs.push(job);
        self.persist(&jobs).await
    }

    /// Replace a job by id and persist.
    pub async fn update(&self, job: ScheduledJob) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.write().await;
        let slot = jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| SchedulerError::NotFound(job.id.clone()))?;
        *slot = job;
        self.persist(&jobs).await
    }

    /// Apply a mutation to a job in place and persist. Returns the
    /// updated job.
    pub async fn mutate<F>(&self, id: &str, f: F) -> Result<ScheduledJob, SchedulerError>
    where
        F: FnOnce(&mut ScheduledJob),
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        f(job);
        let updated = job.clone();
        self.persist(&jobs).await?;
        Ok(updated)
    }

    /// Remove a job by id and persist. Returns false when absent.
    pub async fn remove(&self, id: &str) -> Result<bool, SchedulerError> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return Ok(false);
        }
        self.persist(&jobs).await?;
        Ok(true)
    }

    /// Atomic tmp-write + rename.
    async fn persist(&self, jobs: &[ScheduledJob]) -> Result<(), SchedulerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = StoreFile {
            version: STORE_VERSION,
            jobs: jobs.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
