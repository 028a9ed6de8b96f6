//! Rolling turn-debug trace (`debug.json`).
//!
//! The last 100 turn outcomes, for postmortems without digging through
//! session logs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

const MAX_RECORDS: usize = 100;

/// One recorded turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnDebugRecord {
    pub session_key: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// "ok", "stopped", "timeout", or "error".
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

/// Bounded debug record store.
pub struct DebugTrace {
    path: PathBuf,
    records: Mutex<Vec<TurnDebugRecord>>,
}

impl DebugTrace {
    pub async fn open(state_dir: impl AsRef<Path>) -> Self {
        let path = state_dir.as_ref().join("debug.json");
        let records = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    /// Record one turn; never fails (logs instead).
    pub async fn record(&self, record: TurnDebugRecord) {
        let mut records = self.records.lock().await;
        records.push(record);
        let excess = records.len().saturating_sub(MAX_RECORDS);
        if excess > 0 {
            records.drain(..excess);
        }

        let json = match serde_json::to_string_pretty(&*records) {
            Ok(json) => json,
            Err(e) => {
                warn!("could not serialize debug trace: {}", e);
                return;
            }
        };
        let tmp = self.path.with_extension("json.tmp");
        if let Err(e) = async {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&tmp, &json).await?;
            fs::rename(&tmp, &self.path).await
        }
        .await
        {
            warn!("could not persist debug trace: {}", e);
        }
    }

    pub async fn recent(&self, n: usize) -> Vec<TurnDebugRecord> {
        let records = self.records.lock().await;
        let start = records.len().saturating_sub(n);
        records[start..].to_vec()
    }
}
