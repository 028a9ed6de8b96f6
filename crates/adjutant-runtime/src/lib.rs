//! # Adjutant Runtime
//!
//! The session orchestrator and everything it leans on: the JSONL
//! session store with line-wise repair, the history sanitizer, overflow
//! recovery, the pre-compaction memory flush, prompt assembly, the
//! heartbeat service, and the rolling turn-debug trace.

mod compactor;
mod debug_trace;
mod heartbeat;
mod orchestrator;
mod overflow;
mod prompt;
mod sanitize;
mod session_store;
mod subagent_runner;
mod workspace;

pub use compactor::Compactor;
pub use debug_trace::{DebugTrace, TurnDebugRecord};
pub use heartbeat::{DeliverFn, HeartbeatService, HeartbeatSettings, HeartbeatState};
pub use orchestrator::{Orchestrator, OrchestratorSettings, STOPPED_RESPONSE};
pub use overflow::{classify_failure, FailureKind, Resolution};
pub use prompt::PromptInputs;
pub use sanitize::sanitize_history;
pub use session_store::{SessionSettings, SessionStore};
pub use subagent_runner::OrchestratorRunner;
pub use workspace::WorkspaceContext;
