//! Builtin tools.

mod cron;
mod exec;
mod fs;
mod memory;
mod subagent;
mod web_fetch;

pub use cron::CronTool;
pub use exec::ExecTool;
pub use fs::{FsListTool, FsReadTool, FsWriteTool};
pub use memory::MemoryTool;
pub use subagent::SubagentTool;
pub use web_fetch::WebFetchTool;
