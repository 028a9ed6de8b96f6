//! Session identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque per-conversation identity of the form `<transport>:<scope>:<id>`.
///
/// Synthesized keys use the prefixes `subagent:`, `cron:` and
/// `heartbeat:<transport>` so scheduler- and heartbeat-originated history
/// stays isolated from interactive logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a subagent child run.
    pub fn for_subagent(run_id: &str) -> Self {
        Self(format!("subagent:{}", run_id))
    }

    /// Key for a scheduler-fired turn.
    pub fn for_cron(job_id: &str) -> Self {
        Self(format!("cron:{}", job_id))
    }

    /// Key for a proactive heartbeat turn on the given transport.
    pub fn for_heartbeat(transport: &str) -> Self {
        Self(format!("heartbeat:{}", transport))
    }

    pub fn is_subagent(&self) -> bool {
        self.0.starts_with("subagent:")
    }

    pub fn is_cron(&self) -> bool {
        self.0.starts_with("cron:")
    }

    pub fn is_heartbeat(&self) -> bool {
        self.0.starts_with("heartbeat:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe derivation: every char outside `[A-Za-z0-9_-]`
    /// becomes `_`.
    pub fn safe(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
