//! Per-session consolidation bookkeeping.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use adjutant_protocols::SessionKey;

use crate::error::MemoryError;

/// How far consolidation has advanced through a session's log.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConsolidationState {
    #[serde(default)]
    pub last_consolidated_message_count: usize,
}

/// Stores one state file per session under the agent state directory.
#[derive(Debug, Clone)]
pub struct ConsolidationStateStore {
    dir: PathBuf,
}

impl ConsolidationStateStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: state_dir.as_ref().join("consolidation"),
        }
    }

    fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.safe()))
    }

    /// Load state, defaulting to zero on absence or corruption.
    pub async fn load(&self, key: &SessionKey) -> ConsolidationState {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Corrupt consolidation state at {:?}: {}", path, e);
                ConsolidationState::default()
            }),
            Err(_) => ConsolidationState::default(),
        }
    }

    pub async fn save(
        &self,
        key: &SessionKey,
        state: ConsolidationState,
    ) -> Result<(), MemoryError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string(&state)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidationStateStore::new(dir.path());
        let key = SessionKey::new("telegram:dm:1");

        assert_eq!(store.load(&key).await.last_consolidated_message_count, 0);

        store
            .save(
                &key,
                ConsolidationState {
                    last_consolidated_message_count: 42,
                },
            )
            .await
            .unwrap();
        assert_eq!(store.load(&key).await.last_consolidated_message_count, 42);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsolidationStateStore::new(dir.path());
        let a = SessionKey::new("t:dm:1");
        let b = SessionKey::new("t:dm:2");

        store
            .save(
                &a,
                ConsolidationState {
                    last_consolidated_message_count: 7,
                },
            )
            .await
            .unwrap();
        assert_eq!(store.load(&b).await.last_consolidated_message_count, 0);
    }
}
