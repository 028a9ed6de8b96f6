//! Scheduler engine.
//!
//! Drives enabled jobs at their scheduled moments subject to a global
//! concurrency cap, a per-firing timeout, bounded retry with exponential
//! backoff, and auto-disable after consecutive failures. Every state
//! transition persists through the [`JobStore`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::job::{to_millis, Schedule, ScheduledJob};
use crate::store::JobStore;

/// Callback invoked for each firing. An `Err` counts as a failed
/// attempt; the string is recorded as `last_error`.
pub type OnFire =
    Arc<dyn Fn(ScheduledJob) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_concurrency: usize,
    /// Retries per firing after the first attempt.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_consecutive_failures: u32,
    pub job_timeout: Duration,
    /// Re-check interval for `At` jobs whose arming was lost.
    pub safety_tick: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            max_retries: 2,
            retry_base_delay: Duration::from_secs(5),
            max_consecutive_failures: 5,
            job_timeout: Duration::from_secs(300),
            safety_tick: Duration::from_secs(60),
        }
    }
}

/// Running set + FIFO overflow queue, guarded together.
#[derive(Default)]
struct ExecState {
    running: HashSet<String>,
    pending: VecDeque<String>,
}

/// The job engine.
pub struct Scheduler {
    store: Arc<JobStore>,
    settings: SchedulerSettings,
    on_fire: OnFire,
    exec: Mutex<ExecState>,
    armed: DashMap<String, JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(store: Arc<JobStore>, settings: SchedulerSettings, on_fire: OnFire) -> Arc<Self> {
        Arc::new(Self {
            store,
            settings,
            on_fire,
            exec: Mutex::new(ExecState::default()),
            armed: DashMap::new(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Arm every enabled job, recover missed `At` jobs, and start the
    /// safety tick.
    pub async fn start(self: &Arc<Self>) {
        let now = Utc::now();
        for job in self.store.list().await {
            if !job.enabled {
                continue;
            }
            if job.is_missed_at(now) {
                info!(job = %job.id, "recovering missed at-job");
                self.enqueue_execution(&job.id).await;
            } else {
                self.arm(&job).await;
            }
        }

        let this = Arc::clone(self);
        tokio::spawn(async move { this.safety_tick_loop().await });
        info!("Scheduler started ({} jobs)", self.store.list().await.len());
    }

    /// Signal shutdown and wait for in-flight firings to finish (or the
    /// job timeout to elapse).
    pub async fn stop(&self) {
        self.shutdown.cancel();
        for entry in self.armed.iter() {
            entry.value().abort();
        }
        self.armed.clear();

        let deadline = tokio::time::Instant::now() + self.settings.job_timeout;
        loop {
            if self.exec.lock().await.running.is_empty() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("Scheduler stopping with firings still in flight");
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        info!("Scheduler stopped");
    }

    /// Add a job. Invalid cron expressions are accepted but never armed;
    /// the job stays visible via `list`.
    pub async fn add_job(self: &Arc<Self>, job: ScheduledJob) -> Result<(), SchedulerError> {
        self.store.add(job.clone()).await?;
        if job.enabled {
            self.arm(&job).await;
        }
        Ok(())
    }

    /// Replace a job. Re-enabling resets the consecutive-failure count.
    pub async fn update_job(self: &Arc<Self>, mut job: ScheduledJob) -> Result<(), SchedulerError> {
        let previous = self.store.get(&job.id).await;
        if job.enabled && previous.map(|p| !p.enabled).unwrap_or(false) {
            job.state.consecutive_failures = 0;
        }

        self.unarm(&job.id);
        self.store.update(job.clone()).await?;
        if job.enabled {
            self.arm(&job).await;
        }
        Ok(())
    }

    pub async fn remove_job(&self, id: &str) -> Result<bool, SchedulerError> {
        self.unarm(id);
        self.store.remove(id).await
    }

    pub async fn list_jobs(&self) -> Vec<ScheduledJob> {
        self.store.list().await
    }

    pub async fn get_job(&self, id: &str) -> Option<ScheduledJob> {
        self.store.get(id).await
    }

    /// Arm one job according to its schedule kind.
    async fn arm(self: &Arc<Self>, job: &ScheduledJob) {
        if let Err(e) = job.schedule.validate() {
            warn!(job = %job.id, "schedule not armable: {}", e);
            let _ = self
                .store
                .mutate(&job.id, |j| j.state.next_run_at_ms = None)
                .await;
            return;
        }

        let next = job.schedule.next_occurrence(Utc::now());
        let _ = self
            .store
            .mutate(&job.id, |j| j.state.next_run_at_ms = next.map(to_millis))
            .await;

        let handle = match job.schedule.clone() {
            Schedule::At { time } => {
                let this = Arc::clone(self);
                let id = job.id.clone();
                tokio::spawn(async move {
                    let delay = (time - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tokio::select! {
                        _ = this.shutdown.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    this.enqueue_execution(&id).await;
                })
            }
            Schedule::Every { interval_ms } => {
                let this = Arc::clone(self);
                let id = job.id.clone();
                tokio::spawn(async move {
                    let period = Duration::from_millis(interval_ms.max(1));
                    let mut ticker = tokio::time::interval_at(
                        tokio::time::Instant::now() + period,
                        period,
                    );
                    loop {
                        tokio::select! {
                            _ = this.shutdown.cancelled() => return,
                            _ = ticker.tick() => {}
                        }
                        this.enqueue_execution(&id).await;
                        let _ = this
                            .store
                            .mutate(&id, |j| {
                                j.state.next_run_at_ms =
                                    j.schedule.next_occurrence(Utc::now()).map(to_millis);
                            })
                            .await;
                    }
                })
            }
            Schedule::Cron { .. } => {
                let this = Arc::clone(self);
                let id = job.id.clone();
                let schedule = job.schedule.clone();
                tokio::spawn(async move {
                    loop {
                        let Some(next) = schedule.next_occurrence(Utc::now()) else {
                            debug!(job = %id, "cron schedule exhausted");
                            return;
                        };
                        let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                        tokio::select! {
                            _ = this.shutdown.cancelled() => return,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        this.enqueue_execution(&id).await;
                        let _ = this
                            .store
                            .mutate(&id, |j| {
                                j.state.next_run_at_ms =
                                    j.schedule.next_occurrence(Utc::now()).map(to_millis);
                            })
                            .await;
                    }
                })
            }
        };

        if let Some(previous) = self.armed.insert(job.id.clone(), handle) {
            previous.abort();
        }
        debug!(job = %job.id, next = ?next, "armed");
    }

    fn unarm(&self, id: &str) {
        if let Some((_, handle)) = self.armed.remove(id) {
            handle.abort();
            debug!(job = id, "unarmed");
        }
    }

    /// Admit a firing into the running set or the FIFO queue. Firings
    /// for a job already running or queued are coalesced.
    pub async fn enqueue_execution(self: &Arc<Self>, id: &str) {
        let mut exec = self.exec.lock().await;
        if exec.running.contains(id) || exec.pending.iter().any(|p| p == id) {
            debug!(job = id, "firing coalesced");
            return;
        }

        if exec.running.len() < self.settings.max_concurrency {
            exec.running.insert(id.to_string());
            drop(exec);
            self.spawn_firing(id.to_string());
        } else {
            exec.pending.push_back(id.to_string());
            debug!(job = id, queued = exec.pending.len(), "at capacity; queued");
        }
    }

    /// Spawn one firing as an independent task. Boxed so completion can
    /// drain the queue into further spawns.
    fn spawn_firing(self: &Arc<Self>, id: String) {
        let this = Arc::clone(self);
        let fut: BoxFuture<'static, ()> = Box::pin(async move {
            this.run_one_firing(&id).await;
            for next in this.release_and_drain(&id).await {
                this.spawn_firing(next);
            }
        });
        tokio::spawn(fut);
    }

    /// Remove a finished firing from the running set and admit queued
    /// jobs up to capacity. Returns the ids to spawn.
    async fn release_and_drain(&self, finished: &str) -> Vec<String> {
        let mut exec = self.exec.lock().await;
        exec.running.remove(finished);

        let mut admitted = Vec::new();
        while exec.running.len() < self.settings.max_concurrency {
            let Some(next) = exec.pending.pop_front() else {
                break;
            };
            exec.running.insert(next.clone());
            admitted.push(next);
        }
        admitted
    }

    /// One complete firing: attempts, retry backoff, terminal
    /// bookkeeping.
    async fn run_one_firing(&self, id: &str) {
        let Some(job) = self.store.get(id).await else {
            return;
        };
        if !job.enabled {
            debug!(job = id, "skipping disabled job");
            return;
        }

        let _ = self
            .store
            .mutate(id, |j| {
                j.last_run_at = Some(Utc::now());
                j.run_count += 1;
            })
            .await;

        let mut success = false;
        let mut last_error = None;
        let mut attempt = 0u32;

        loop {
            let outcome =
                tokio::time::timeout(self.settings.job_timeout, (self.on_fire)(job.clone())).await;

            match outcome {
                Ok(Ok(())) => {
                    success = true;
                    break;
                }
                Ok(Err(e)) => {
                    warn!(job = id, attempt, "firing failed: {}", e);
                    last_error = Some(e);
                    if attempt >= self.settings.max_retries {
                        break;
                    }
                    let delay = self.settings.retry_base_delay * 2u32.pow(attempt);
                    let _ = self
                        .store
                        .mutate(id, |j| {
                            j.state.last_retry_at_ms = Some(to_millis(Utc::now()));
                        })
                        .await;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(_) => {
                    // A task that hit the timeout likely hung; retrying
                    // would stack more copies of it.
                    warn!(job = id, "firing timed out");
                    last_error =
                        Some(format!("timed out after {:?}", self.settings.job_timeout));
                    break;
                }
            }
        }

        if success {
            if job.delete_after_run {
                info!(job = id, "completed; delete-after-run");
                self.unarm(id);
                let _ = self.store.remove(id).await;
                return;
            }
            let _ = self
                .store
                .mutate(id, |j| {
                    j.last_error = None;
                    j.state.consecutive_failures = 0;
                    j.state.next_run_at_ms =
                        j.schedule.next_occurrence(Utc::now()).map(to_millis);
                })
                .await;
            return;
        }

        let updated = self
            .store
            .mutate(id, |j| {
                j.last_error = last_error.clone();
                j.state.consecutive_failures += 1;
                if j.state.consecutive_failures >= self.settings.max_consecutive_failures {
                    j.enabled = false;
                    j.state.next_run_at_ms = None;
                } else {
                    j.state.next_run_at_ms =
                        j.schedule.next_occurrence(Utc::now()).map(to_millis);
                }
            })
            .await;

        if let Ok(job) = updated {
            if !job.enabled {
                warn!(
                    job = id,
                    failures = job.state.consecutive_failures,
                    "auto-disabled after consecutive failures"
                );
                self.unarm(id);
            }
        }
    }

    /// Re-check `At` jobs whose arming was lost.
    async fn safety_tick_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.settings.safety_tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let now = Utc::now();
            for job in self.store.list().await {
                if job.enabled && job.is_missed_at(now) && !self.armed.contains_key(&job.id) {
                    info!(job = %job.id, "safety tick recovering at-job");
                    self.enqueue_execution(&job.id).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
