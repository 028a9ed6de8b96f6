//! Configuration schema definitions.
//!
//! Every section is optional in the TOML file; defaults match the
//! runtime's documented behavior.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub transports: HashMap<String, TransportConfig>,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub subagents: SubagentsConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    #[serde(default)]
    pub consolidation: ConsolidationConfig,
}

/// Model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key; usually supplied as `${ADJUTANT_MODEL_KEY}`.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Context window used for flush/compaction budgeting.
    #[serde(default = "default_context_window")]
    pub context_window_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            context_window_tokens: default_context_window(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_context_window() -> u32 {
    200_000
}

/// Filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Agent state directory (sessions, stores, debug trace).
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Workspace directory (memory docs, skills, bootstrap files).
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            workspace_dir: default_workspace_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".adjutant")
        .join("state")
}

fn default_workspace_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".adjutant")
        .join("workspace")
}

/// Per-transport configuration. Transport-specific settings live in
/// `options` and are interpreted by the adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub options: HashMap<String, toml::Value>,
}

/// Session orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hard per-run timeout.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,

    /// Attempts through the overflow resolver per run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// User turns retained by the history sanitizer.
    #[serde(default = "default_max_user_turns")]
    pub max_user_turns: usize,

    /// Reserve tokens kept free for compaction.
    #[serde(default = "default_compaction_reserve")]
    pub compaction_reserve_tokens: u32,

    /// Soft budget that triggers the pre-compaction memory flush.
    #[serde(default = "default_flush_soft_budget")]
    pub flush_soft_budget_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: default_turn_timeout_secs(),
            max_attempts: default_max_attempts(),
            max_user_turns: default_max_user_turns(),
            compaction_reserve_tokens: default_compaction_reserve(),
            flush_soft_budget_tokens: default_flush_soft_budget(),
        }
    }
}

fn default_turn_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_user_turns() -> usize {
    100
}

fn default_compaction_reserve() -> u32 {
    20_000
}

fn default_flush_soft_budget() -> u32 {
    4_000
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_concurrency")]
    pub max_concurrency: usize,

    /// Retries per firing after the first attempt.
    #[serde(default = "default_scheduler_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_scheduler_concurrency(),
            max_retries: default_scheduler_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

fn default_scheduler_concurrency() -> usize {
    3
}

fn default_scheduler_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    5_000
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_job_timeout_secs() -> u64 {
    300
}

/// Subagent limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentsConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "default_max_children")]
    pub max_children_per_session: usize,

    #[serde(default = "default_max_concurrent_total")]
    pub max_concurrent_total: usize,
}

impl Default for SubagentsConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_children_per_session: default_max_children(),
            max_concurrent_total: default_max_concurrent_total(),
        }
    }
}

fn default_max_depth() -> u32 {
    2
}

fn default_max_children() -> usize {
    5
}

fn default_max_concurrent_total() -> usize {
    10
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_enabled")]
    pub enabled: bool,

    #[serde(default = "default_heartbeat_interval_mins")]
    pub interval_mins: u64,

    /// Floor between successive fires, enforced across restarts.
    #[serde(default = "default_heartbeat_min_interval_mins")]
    pub min_interval_mins: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: default_heartbeat_enabled(),
            interval_mins: default_heartbeat_interval_mins(),
            min_interval_mins: default_heartbeat_min_interval_mins(),
        }
    }
}

fn default_heartbeat_enabled() -> bool {
    true
}

fn default_heartbeat_interval_mins() -> u64 {
    30
}

fn default_heartbeat_min_interval_mins() -> u64 {
    10
}

/// Long-term memory consolidation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    #[serde(default = "default_consolidation_enabled")]
    pub enabled: bool,

    /// New messages since the last consolidation that trigger a run.
    #[serde(default = "default_consolidation_threshold")]
    pub threshold: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: default_consolidation_enabled(),
            threshold: default_consolidation_threshold(),
        }
    }
}

fn default_consolidation_enabled() -> bool {
    true
}

fn default_consolidation_threshold() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.orchestrator.turn_timeout_secs, 300);
        assert_eq!(config.orchestrator.max_user_turns, 100);
        assert_eq!(config.scheduler.max_concurrency, 3);
        assert_eq!(config.scheduler.max_retries, 2);
        assert_eq!(config.scheduler.max_consecutive_failures, 5);
        assert_eq!(config.subagents.max_depth, 2);
        assert_eq!(config.subagents.max_children_per_session, 5);
        assert_eq!(config.subagents.max_concurrent_total, 10);
        assert_eq!(config.heartbeat.interval_mins, 30);
        assert_eq!(config.heartbeat.min_interval_mins, 10);
        assert_eq!(config.consolidation.threshold, 50);
    }
}
