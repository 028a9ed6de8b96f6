//! Prompt-failure classification and recovery decisions.

use std::time::Duration;

/// What kind of failure a model call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The prompt no longer fits the context window.
    ContextOverflow,
    /// Worth retrying with backoff.
    Transient,
    /// Everything else; surfaced to the user as-is.
    Unknown,
}

/// What the orchestrator should do next.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Terminal: reply with this text.
    Respond(String),
    /// Sleep, then run the attempt again.
    Retry { delay: Duration },
}

const OVERFLOW_PATTERNS: &[&str] = &[
    "request_too_large",
    "context length exceeded",
    "context_length_exceeded",
    "prompt is too long",
    "maximum context length",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "429",
    "503",
    "529",
    "overloaded",
    "connection reset",
    "connection refused",
    "timed out",
    "timeout",
];

/// Classify a prompt-failure string.
pub fn classify_failure(error: &str) -> FailureKind {
    let lower = error.to_lowercase();

    if OVERFLOW_PATTERNS.iter().any(|p| lower.contains(p))
        || (lower.contains("413") && lower.contains("too large"))
    {
        return FailureKind::ContextOverflow;
    }
    if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return FailureKind::Transient;
    }
    FailureKind::Unknown
}

/// Backoff for a transient failure: `min(1000 * 2^attempt, 15000)` ms.
pub fn transient_delay(attempt: u32) -> Duration {
    let ms = 1000u64.saturating_mul(2u64.saturating_pow(attempt)).min(15_000);
    Duration::from_millis(ms)
}

/// Retries allowed for transient failures.
pub const MAX_TRANSIENT_RETRIES: u32 = 2;

/// Message shown to the user after a forced session reset.
pub const RESET_MESSAGE: &str = "The conversation history grew past what I can process, and \
     compacting it did not help, so I had to reset this session. Long-term notes in memory \
     are unaffected. What were we working on?";
