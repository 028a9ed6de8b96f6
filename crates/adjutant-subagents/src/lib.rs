//! # Adjutant Subagents
//!
//! Bounded fan-out of background reasoning sessions. The registry is the
//! durable record of every run; the spawner enforces depth, per-parent
//! and global limits, runs children through an injected runner, and
//! announces completions back to the parent session.

mod error;
mod registry;
mod run;
mod spawner;

pub use error::SubagentError;
pub use registry::SubagentRegistry;
pub use run::{SubagentRun, SubagentStatus};
pub use spawner::{
    AnnounceFn, AnnounceInfo, SpawnOutcome, SpawnRequest, SubagentLimits, SubagentRunner,
    SubagentSpawner,
};
