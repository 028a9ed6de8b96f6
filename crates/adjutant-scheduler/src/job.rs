//! Job records and schedule evaluation.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use adjutant_protocols::SessionKey;

use crate::error::SchedulerError;

/// When a job fires. Serialized camelCase for wire compatibility with
/// existing stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Schedule {
    /// Fire once at the given instant.
    At { time: DateTime<Utc> },
    /// Fire at each cron occurrence. Standard 5-field expressions
    /// (minute hour day-of-month month day-of-week).
    Cron {
        expr: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
    /// Fire at a fixed interval from job creation.
    #[serde(rename_all = "camelCase")]
    Every { interval_ms: u64 },
}

impl Schedule {
    /// Next occurrence strictly after `after`, or `None` when the
    /// schedule is exhausted or unparseable.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::At { time } => (*time > after).then_some(*time),
            Schedule::Cron { expr, tz } => {
                let schedule = parse_cron(expr).ok()?;
                match tz.as_deref().map(Tz::from_str) {
                    Some(Ok(tz)) => schedule
                        .after(&after.with_timezone(&tz))
                        .next()
                        .map(|t| t.with_timezone(&Utc)),
                    Some(Err(_)) => None,
                    None => schedule.after(&after).next(),
                }
            }
            Schedule::Every { interval_ms } => {
                Some(after + chrono::Duration::milliseconds(*interval_ms as i64))
            }
        }
    }

    /// Validate the schedule is evaluable.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        match self {
            Schedule::At { .. } | Schedule::Every { .. } => Ok(()),
            Schedule::Cron { expr, tz } => {
                parse_cron(expr)?;
                if let Some(tz) = tz {
                    Tz::from_str(tz).map_err(|_| SchedulerError::UnknownTimezone(tz.clone()))?;
                }
                Ok(())
            }
        }
    }
}

/// Parse a cron expression, accepting the standard 5-field form by
/// prepending a seconds field of `0`.
pub fn parse_cron(expr: &str) -> Result<cron::Schedule, SchedulerError> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };
    cron::Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// What a firing delivers to the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobPayload {
    /// A system-framed note injected into the session.
    SystemEvent { text: String },
    /// A full agent turn, as if the user had sent `message`.
    AgentTurn { message: String },
}

/// Runtime-derived per-job state, separated so the durable record
/// round-trips independently of it. Missing on v1 records.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<i64>,

    #[serde(default)]
    pub consecutive_failures: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_retry_at_ms: Option<i64>,
}

/// One durable scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub delete_after_run: bool,
    pub schedule: Schedule,
    pub payload: JobPayload,
    /// Delivery target.
    pub session_key: SessionKey,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// v1 records lack this field; it defaults on load.
    #[serde(default)]
    pub state: JobState,
}

impl ScheduledJob {
    /// New job with the given schedule. `At` schedules default to
    /// delete-after-run.
    pub fn new(
        name: impl Into<String>,
        schedule: Schedule,
        payload: JobPayload,
        session_key: SessionKey,
    ) -> Self {
        let delete_after_run = matches!(schedule, Schedule::At { .. });
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            delete_after_run,
            schedule,
            payload,
            session_key,
            created_at: Utc::now(),
            last_run_at: None,
            run_count: 0,
            last_error: None,
            state: JobState::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_delete_after_run(mut self, delete: bool) -> Self {
        self.delete_after_run = delete;
        self
    }

    /// Whether this is an `At` job whose moment has already passed and
    /// which never ran; this is the missed-job recovery predicate.
    pub fn is_missed_at(&self, now: DateTime<Utc>) -> bool {
        matches!(&self.schedule, Schedule::At { time } if *time <= now) && self.run_count == 0
    }
}

/// Millisecond timestamp helper for `state` fields.
pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}
