//! JSONL session logs with best-effort repair.
//!
//! One file per session under `sessions/<safeSessionKey>.jsonl`, one
//! record per line. Repair runs before a file is used: unparseable
//! lines and records with dangling tool_use/tool_result pairs are
//! dropped, and the file is rewritten atomically only when something
//! was actually dropped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use adjutant_protocols::{Role, SessionKey, SessionMessage, StoreError};

/// Per-session tunables, stored as a sidecar file. Written through on
/// every turn so external edits cannot lower the compaction reserve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_reserve_tokens")]
    pub compaction_reserve_tokens: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            compaction_reserve_tokens: default_reserve_tokens(),
        }
    }
}

fn default_reserve_tokens() -> u32 {
    20_000
}

/// File-backed session store.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: state_dir.as_ref().join("sessions"),
        }
    }

    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{}.jsonl", key.safe()))
    }

    fn settings_path(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{}.settings.json", key.safe()))
    }

    /// Repair (if needed) and load a session log. Never fails: on any
    /// unrecoverable error the session starts empty and the problem is
    /// logged.
    pub async fn load(&self, key: &SessionKey) -> Vec<SessionMessage> {
        match self.repair_and_read(key).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(session = %key, "could not load session log: {}", e);
                Vec::new()
            }
        }
    }

    /// Append messages to the session log.
    pub async fn append(
        &self,
        key: &SessionKey,
        messages: &[SessionMessage],
    ) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).await?;

        let mut lines = String::new();
        for message in messages {
            lines.push_str(&serde_json::to_string(message)?);
            lines.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(key))
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Replace the whole log atomically.
    pub async fn rewrite(
        &self,
        key: &SessionKey,
        messages: &[SessionMessage],
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;

        let mut lines = String::new();
        for message in messages {
            lines.push_str(&serde_json::to_string(message)?);
            lines.push('\n');
        }

        let path = self.path_for(key);
        let tmp = path.with_extension("jsonl.tmp");
        fs::write(&tmp, lines).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Empty the log (controlled session reset).
    pub async fn truncate(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.rewrite(key, &[]).await
    }

    /// Load session settings, enforcing the compaction-reserve floor and
    /// writing the result back.
    pub async fn ensure_settings(&self, key: &SessionKey) -> SessionSettings {
        let path = self.settings_path(key);
        let mut settings = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => SessionSettings::default(),
        };

        if settings.compaction_reserve_tokens < default_reserve_tokens() {
            settings.compaction_reserve_tokens = default_reserve_tokens();
        }

        if let Err(e) = self.write_settings(&path, settings).await {
            warn!(session = %key, "could not persist session settings: {}", e);
        }
        settings
    }

    async fn write_settings(
        &self,
        path: &Path,
        settings: SessionSettings,
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string(&settings)?).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Line-wise repair: drop unparseable records and records whose
    /// tool_use/tool_result pairing dangles, then rewrite only if
    /// something was dropped.
    async fn repair_and_read(&self, key: &SessionKey) -> Result<Vec<SessionMessage>, StoreError> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut parsed: Vec<SessionMessage> = Vec::new();
        let mut dropped = 0usize;

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionMessage>(line) {
                Ok(message) => parsed.push(message),
                Err(e) => {
                    debug!(session = %key, "dropping unparseable record: {}", e);
                    dropped += 1;
                }
            }
        }

        let (repaired, pair_dropped) = drop_dangling_pairs(parsed);
        dropped += pair_dropped;

        if dropped > 0 {
            warn!(session = %key, dropped, "repaired session log");
            self.rewrite(key, &repaired).await?;
        }
        Ok(repaired)
    }
}

/// Drop records participating in a dangling tool_use/tool_result pair:
/// an assistant record with tool_use blocks not answered by the
/// immediately following record, or a tool record answering nothing.
fn drop_dangling_pairs(messages: Vec<SessionMessage>) -> (Vec<SessionMessage>, usize) {
    let mut keep = vec![true; messages.len()];

    for (i, message) in messages.iter().enumerate() {
        match message.role {
            Role::Assistant => {
                let uses = message.tool_use_ids();
                if uses.is_empty() {
                    continue;
                }
                let answered = messages
                    .get(i + 1)
                    .filter(|next| next.role != Role::Assistant)
                    .map(|next| {
                        let results = next.tool_result_ids();
                        uses.iter().all(|id| results.contains(id))
                    })
                    .unwrap_or(false);
                if !answered {
                    keep[i] = false;
                }
            }
            Role::Tool => {
                let results = message.tool_result_ids();
                if results.is_empty() {
                    continue;
                }
                let asked = i
                    .checked_sub(1)
                    .and_then(|p| messages.get(p))
                    .filter(|prev| prev.role == Role::Assistant && keep[i - 1])
                    .map(|prev| {
                        let uses = prev.tool_use_ids();
                        results.iter().all(|id| uses.contains(id))
                    })
                    .unwrap_or(false);
                if !asked {
                    keep[i] = false;
                }
            }
            _ => {}
        }
    }

    let dropped = keep.iter().filter(|k| !**k).count();
    let kept = messages
        .into_iter()
        .zip(keep)
        .filter_map(|(m, k)| k.then_some(m))
        .collect();
    (kept, dropped)
}

#[cfg(test)]
#[path = "session_store_tests.rs"]
mod tests;
