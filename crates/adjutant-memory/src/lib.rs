//! # Adjutant Memory
//!
//! Three layers of long-term memory:
//!
//! - a structured store (`memory/memory.json`), mutated only by the
//!   memory tool;
//! - unstructured docs: `memory/MEMORY.md` (current facts, rewritten on
//!   each consolidation) and `memory/HISTORY.md` (append-only event log);
//! - the consolidator, which drives a secondary model call to distill
//!   session history into the docs.

mod consolidator;
mod docs;
mod error;
mod state;
mod store;

pub use consolidator::{Consolidator, ConsolidatorSettings};
pub use docs::MemoryDocs;
pub use error::MemoryError;
pub use state::{ConsolidationState, ConsolidationStateStore};
pub use store::{MemoryEntry, MemoryStore};
