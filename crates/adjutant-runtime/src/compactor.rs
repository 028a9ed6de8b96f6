//! In-place history compaction.
//!
//! Summarizes the older half of a session log through a secondary model
//! call and replaces it with a single system note, reclaiming
//! context-window space without losing the thread.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use adjutant_protocols::{
    ModelClient, ModelRequest, Role, SessionKey, SessionMessage,
};

use crate::session_store::SessionStore;

/// Compacts session history via a summarization model call.
pub struct Compactor {
    model: Arc<dyn ModelClient>,
}

impl Compactor {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// Compact the given log in place, rewriting the session file.
    /// Returns the compacted log, or an error string when compaction
    /// could not be performed (too little history, model failure).
    pub async fn compact(
        &self,
        sessions: &SessionStore,
        key: &SessionKey,
        messages: &[SessionMessage],
    ) -> Result<Vec<SessionMessage>, String> {
        if messages.len() < 8 {
            return Err("history too short to compact".to_string());
        }

        let split = messages.len() / 2;
        let (older, newer) = messages.split_at(split);

        let transcript: String = older
            .iter()
            .filter_map(|m| {
                let text = m.text();
                if text.trim().is_empty() {
                    return None;
                }
                let speaker = match m.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                    _ => return None,
                };
                Some(format!("{}: {}", speaker, text.trim()))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Summarize the following conversation segment in a compact paragraph. \
             Keep decisions, facts, names, and open threads; drop pleasantries.\n\n{}",
            transcript
        );

        let request = ModelRequest::new(
            "You compact conversation history for a personal assistant.",
            vec![SessionMessage::user(prompt)],
        );
        let response = self
            .model
            .complete(request, &CancellationToken::new())
            .await
            .map_err(|e| format!("compaction model call failed: {}", e))?;

        let summary = response.message.text();
        if summary.trim().is_empty() {
            return Err("compaction produced an empty summary".to_string());
        }

        let mut compacted = Vec::with_capacity(newer.len() + 1);
        compacted.push(SessionMessage::system(format!(
            "[Earlier conversation, summarized]\n{}",
            summary.trim()
        )));
        compacted.extend_from_slice(newer);

        if let Err(e) = sessions.rewrite(key, &compacted).await {
            warn!(session = %key, "could not persist compacted log: {}", e);
            return Err(e.to_string());
        }

        info!(
            session = %key,
            before = messages.len(),
            after = compacted.len(),
            "compacted session history"
        );
        Ok(compacted)
    }
}
