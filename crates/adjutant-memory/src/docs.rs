//! Unstructured memory docs.
//!
//! `MEMORY.md` holds current long-term facts and is rewritten wholesale
//! by the consolidator; `HISTORY.md` is an append-only event log with
//! one timestamped line per event. Both live under the workspace
//! `memory/` directory and are owned by this module.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::MemoryError;

/// Handle to the workspace memory docs.
#[derive(Debug, Clone)]
pub struct MemoryDocs {
    memory_dir: PathBuf,
}

impl MemoryDocs {
    /// `workspace_dir/memory/` holds both docs.
    pub fn new(workspace_dir: impl AsRef<Path>) -> Self {
        Self {
            memory_dir: workspace_dir.as_ref().join("memory"),
        }
    }

    pub fn memory_path(&self) -> PathBuf {
        self.memory_dir.join("MEMORY.md")
    }

    pub fn history_path(&self) -> PathBuf {
        self.memory_dir.join("HISTORY.md")
    }

    /// Current long-term facts, if the doc exists.
    pub async fn read_memory(&self) -> Option<String> {
        fs::read_to_string(self.memory_path()).await.ok()
    }

    /// First `max_chars` of MEMORY.md, on a char boundary.
    pub async fn memory_head(&self, max_chars: usize) -> Option<String> {
        let content = self.read_memory().await?;
        if content.len() <= max_chars {
            return Some(content);
        }
        let boundary = floor_char_boundary(&content, max_chars);
        Some(content[..boundary].to_string())
    }

    /// Last `max_lines` of HISTORY.md.
    pub async fn history_tail(&self, max_lines: usize) -> Option<String> {
        let content = fs::read_to_string(self.history_path()).await.ok()?;
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        Some(lines[start..].join("\n"))
    }

    /// Replace MEMORY.md atomically.
    pub async fn replace_memory(&self, content: &str) -> Result<(), MemoryError> {
        fs::create_dir_all(&self.memory_dir).await?;
        let path = self.memory_path();
        let tmp = path.with_extension("md.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;
        debug!("Rewrote {:?} ({} chars)", path, content.len());
        Ok(())
    }

    /// Append event lines to HISTORY.md, each prefixed with a UTC
    /// timestamp.
    pub async fn append_history(&self, events: &str) -> Result<(), MemoryError> {
        let events = events.trim();
        if events.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&self.memory_dir).await?;
        let stamp = Utc::now().format("%Y-%m-%d %H:%M");
        let mut block = String::new();
        for line in events.lines().filter(|l| !l.trim().is_empty()) {
            block.push_str(&format!("- [{}] {}\n", stamp, line.trim()));
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())
            .await?;
        file.write_all(block.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Largest index `<= max` that falls on a char boundary.
pub(crate) fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
