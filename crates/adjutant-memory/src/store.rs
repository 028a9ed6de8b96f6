//! Structured memory store.
//!
//! An ordered sequence of tagged entries persisted atomically to
//! `memory/memory.json`. Only the memory tool mutates this store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::MemoryError;

/// One remembered fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// File-backed structured memory store.
pub struct MemoryStore {
    path: PathBuf,
    entries: RwLock<Vec<MemoryEntry>>,
}

impl MemoryStore {
    /// Open the store, loading existing entries. An unreadable file is
    /// logged and replaced with an empty store on the next write.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();

        let entries = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Vec<MemoryEntry>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Corrupt memory store at {:?}, starting fresh: {}", path, e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Loaded {} memory entries from {:?}", entries.len(), path);
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Store a new entry.
    pub async fn store(
        &self,
        content: impl Into<String>,
        tags: Vec<String>,
    ) -> Result<MemoryEntry, MemoryError> {
        let now = Utc::now();
        let entry = MemoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            tags,
            created_at: now,
            updated_at: now,
        };

        let mut entries = self.entries.write().await;
        entries.push(entry.clone());
        self.persist(&entries).await?;
        Ok(entry)
    }

    /// Case-insensitive substring search, most relevant first.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<MemoryEntry> {
        let query = query.to_lowercase();
        let entries = self.entries.read().await;

        let mut scored: Vec<(f32, &MemoryEntry)> = entries
            .iter()
            .filter_map(|e| {
                let score = relevance(e, &query);
                (score > 0.0).then_some((score, e))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// All entries in insertion order.
    pub async fn list(&self) -> Vec<MemoryEntry> {
        self.entries.read().await.clone()
    }

    /// Delete by id. Returns false when the id is unknown.
    pub async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.id != id);

        if entries.len() == before {
            return Ok(false);
        }
        self.persist(&entries).await?;
        Ok(true)
    }

    /// Update an entry's content and (optionally) tags.
    pub async fn update(
        &self,
        id: &str,
        content: impl Into<String>,
        tags: Option<Vec<String>>,
    ) -> Result<MemoryEntry, MemoryError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

        entry.content = content.into();
        if let Some(tags) = tags {
            entry.tags = tags;
        }
        entry.updated_at = Utc::now();
        let updated = entry.clone();

        self.persist(&entries).await?;
        Ok(updated)
    }

    /// Atomic tmp-write + rename.
    async fn persist(&self, entries: &[MemoryEntry]) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Relevance score: occurrence density of the query in content and tags.
fn relevance(entry: &MemoryEntry, query_lower: &str) -> f32 {
    let content = entry.content.to_lowercase();
    let mut score = if content.contains(query_lower) {
        let occurrences = content.matches(query_lower).count();
        (occurrences as f32 / (content.len().max(1) as f32 / 100.0)).min(1.0)
    } else {
        0.0
    };

    if entry
        .tags
        .iter()
        .any(|t| t.to_lowercase().contains(query_lower))
    {
        score = (score + 0.5).min(1.0);
    }
    score
}
