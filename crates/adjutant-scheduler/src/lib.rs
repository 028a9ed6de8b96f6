//! # Adjutant Scheduler
//!
//! Durable job engine: one-shot (`At`), cron, and fixed-interval
//! (`Every`) schedules with a global concurrency cap, bounded per-firing
//! retry with exponential backoff, auto-disable after consecutive
//! failures, and missed-job recovery on startup. All state transitions
//! persist atomically to `cron-store.json`.

mod engine;
mod error;
mod job;
mod store;

pub use engine::{OnFire, Scheduler, SchedulerSettings};
pub use error::SchedulerError;
pub use job::{JobPayload, JobState, Schedule, ScheduledJob};
pub use store::JobStore;
