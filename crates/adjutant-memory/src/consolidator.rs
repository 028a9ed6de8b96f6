//! Long-term memory consolidation.
//!
//! After enough new turns accumulate in a session, a secondary model
//! call distills them into the memory docs. The reply must be framed by
//! two literal marker pairs; MEMORY content replaces `MEMORY.md`
//! wholesale, HISTORY content is appended to `HISTORY.md`. Errors are
//! logged and never surfaced to the user; the per-session counter only
//! advances on a successful parse and write.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use adjutant_protocols::{ModelClient, ModelRequest, Role, SessionKey, SessionMessage};

use crate::docs::{floor_char_boundary, MemoryDocs};
use crate::error::MemoryError;
use crate::state::{ConsolidationState, ConsolidationStateStore};

const MEMORY_START: &str = "===MEMORY===";
const MEMORY_END: &str = "===END_MEMORY===";
const HISTORY_START: &str = "===HISTORY===";
const HISTORY_END: &str = "===END_HISTORY===";

/// Consolidator tuning.
#[derive(Debug, Clone)]
pub struct ConsolidatorSettings {
    pub enabled: bool,
    /// New messages since the last run that trigger consolidation.
    pub threshold: usize,
    /// Transcript budget for the secondary call.
    pub max_transcript_chars: usize,
}

impl Default for ConsolidatorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 50,
            max_transcript_chars: 60_000,
        }
    }
}

/// Drives the consolidation model call and owns the memory docs.
pub struct Consolidator {
    model: Arc<dyn ModelClient>,
    docs: MemoryDocs,
    states: ConsolidationStateStore,
    settings: ConsolidatorSettings,
}

impl Consolidator {
    pub fn new(
        model: Arc<dyn ModelClient>,
        docs: MemoryDocs,
        states: ConsolidationStateStore,
        settings: ConsolidatorSettings,
    ) -> Self {
        Self {
            model,
            docs,
            states,
            settings,
        }
    }

    /// Run consolidation if the threshold is met. All failures are
    /// logged and swallowed; this is always safe to fire-and-forget.
    pub async fn maybe_run(&self, key: &SessionKey, messages: &[SessionMessage]) {
        if !self.settings.enabled {
            return;
        }

        let state = self.states.load(key).await;
        let new_messages = messages
            .len()
            .saturating_sub(state.last_consolidated_message_count);
        if new_messages < self.settings.threshold {
            debug!(
                session = %key,
                new_messages,
                threshold = self.settings.threshold,
                "consolidation not due"
            );
            return;
        }

        info!(session = %key, new_messages, "running memory consolidation");
        if let Err(e) = self.run(key, messages, state).await {
            warn!(session = %key, "consolidation failed: {}", e);
        }
    }

    async fn run(
        &self,
        key: &SessionKey,
        messages: &[SessionMessage],
        state: ConsolidationState,
    ) -> Result<(), MemoryError> {
        let existing = self.docs.read_memory().await.unwrap_or_default();
        let transcript = render_transcript(
            &messages[state.last_consolidated_message_count.min(messages.len())..],
            self.settings.max_transcript_chars,
        );

        let prompt = build_prompt(&existing, &transcript);
        let request = ModelRequest::new(
            "You are the memory consolidation pass of a personal assistant.",
            vec![SessionMessage::user(prompt)],
        );

        let response = self
            .model
            .complete(request, &CancellationToken::new())
            .await
            .map_err(|e| MemoryError::Model(e.to_string()))?;

        let text = response.message.text();
        let memory = extract_section(&text, MEMORY_START, MEMORY_END)
            .ok_or_else(|| MemoryError::BadReply("no MEMORY section".to_string()))?;
        let history = extract_section(&text, HISTORY_START, HISTORY_END)
            .ok_or_else(|| MemoryError::BadReply("no HISTORY section".to_string()))?;

        self.docs.replace_memory(memory.trim()).await?;
        self.docs.append_history(&history).await?;

        self.states
            .save(
                key,
                ConsolidationState {
                    last_consolidated_message_count: messages.len(),
                },
            )
            .await?;

        info!(session = %key, "memory consolidation complete");
        Ok(())
    }
}

fn build_prompt(existing_memory: &str, transcript: &str) -> String {
    format!(
        "Distill the conversation below into long-term memory.\n\
         \n\
         Reply with exactly two sections framed by literal markers:\n\
         {MEMORY_START}\n<the full replacement for MEMORY.md: merged, current facts>\n{MEMORY_END}\n\
         {HISTORY_START}\n<new noteworthy events, one per line>\n{HISTORY_END}\n\
         \n\
         Current MEMORY.md:\n{existing}\n\
         \n\
         Conversation:\n{transcript}",
        existing = if existing_memory.is_empty() {
            "(empty)"
        } else {
            existing_memory
        },
        transcript = transcript,
    )
}

/// Render user/assistant text turns, newest kept within the budget.
fn render_transcript(messages: &[SessionMessage], max_chars: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    for msg in messages {
        let text = msg.text();
        if text.trim().is_empty() {
            continue;
        }
        let speaker = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            _ => continue,
        };
        lines.push(format!("{}: {}", speaker, text.trim()));
    }

    let mut transcript = lines.join("\n");
    if transcript.len() > max_chars {
        // Keep the tail: recent turns matter most.
        let start = transcript.len() - max_chars;
        let boundary = floor_char_boundary(&transcript, start);
        transcript = transcript[boundary..].to_string();
    }
    transcript
}

fn extract_section<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = text[from..].find(end)? + from;
    Some(&text[from..to])
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use adjutant_protocols::{ModelError, ModelResponse};
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().map(String::from).collect()),
            })
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete(
            &self,
            _request: ModelRequest,
            _cancel: &CancellationToken,
        ) -> Result<ModelResponse, ModelError> {
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .ok_or(ModelError::EmptyResponse)?;
            Ok(ModelResponse {
                message: SessionMessage::assistant(reply),
            })
        }
    }

    fn many_messages(n: usize) -> Vec<SessionMessage> {
        (0..n)
            .flat_map(|i| {
                [
                    SessionMessage::user(format!("question {}", i)),
                    SessionMessage::assistant(format!("answer {}", i)),
                ]
            })
            .collect()
    }

    fn framed_reply() -> &'static str {
        "===MEMORY===\n- user is named Kim\n===END_MEMORY===\n===HISTORY===\nplanned a trip\n===END_HISTORY==="
    }

    #[test]
    fn extract_section_finds_framed_content() {
        let text = framed_reply();
        assert_eq!(
            extract_section(text, MEMORY_START, MEMORY_END).map(str::trim),
            Some("- user is named Kim")
        );
        assert_eq!(
            extract_section(text, HISTORY_START, HISTORY_END).map(str::trim),
            Some("planned a trip")
        );
        assert!(extract_section("no markers here", MEMORY_START, MEMORY_END).is_none());
    }

    #[tokio::test]
    async fn consolidation_writes_docs_and_advances_counter() {
        let dir = tempfile::tempdir().unwrap();
        let docs = MemoryDocs::new(dir.path());
        let states = ConsolidationStateStore::new(dir.path());
        let key = SessionKey::new("t:dm:1");

        let consolidator = Consolidator::new(
            ScriptedModel::new(vec![framed_reply()]),
            docs.clone(),
            states.clone(),
            ConsolidatorSettings {
                threshold: 10,
                ..Default::default()
            },
        );

        let messages = many_messages(10);
        consolidator.maybe_run(&key, &messages).await;

        assert!(docs.read_memory().await.unwrap().contains("Kim"));
        assert!(docs.history_tail(5).await.unwrap().contains("planned a trip"));
        assert_eq!(
            states.load(&key).await.last_consolidated_message_count,
            messages.len()
        );
    }

    #[tokio::test]
    async fn below_threshold_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let docs = MemoryDocs::new(dir.path());
        let states = ConsolidationStateStore::new(dir.path());
        let key = SessionKey::new("t:dm:1");

        let consolidator = Consolidator::new(
            ScriptedModel::new(vec![framed_reply()]),
            docs.clone(),
            states.clone(),
            ConsolidatorSettings {
                threshold: 50,
                ..Default::default()
            },
        );

        consolidator.maybe_run(&key, &many_messages(3)).await;
        assert!(docs.read_memory().await.is_none());
    }

    #[tokio::test]
    async fn unframed_reply_leaves_counter_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let docs = MemoryDocs::new(dir.path());
        let states = ConsolidationStateStore::new(dir.path());
        let key = SessionKey::new("t:dm:1");

        let consolidator = Consolidator::new(
            ScriptedModel::new(vec!["I forgot the markers, sorry"]),
            docs.clone(),
            states.clone(),
            ConsolidatorSettings {
                threshold: 10,
                ..Default::default()
            },
        );

        consolidator.maybe_run(&key, &many_messages(10)).await;
        assert!(docs.read_memory().await.is_none());
        assert_eq!(states.load(&key).await.last_consolidated_message_count, 0);
    }

    #[test]
    fn transcript_keeps_the_tail_under_budget() {
        let messages = many_messages(100);
        let transcript = render_transcript(&messages, 200);
        assert!(transcript.len() <= 200);
        assert!(transcript.contains("99"));
    }
}
