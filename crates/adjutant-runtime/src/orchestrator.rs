//! Session orchestrator.
//!
//! Drives one reasoning turn per inbound message with per-session
//! serialization, cancellation, a hard turn timeout, and recovery
//! through the overflow resolver. Consolidation is kicked off
//! fire-and-forget after every run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use adjutant_memory::{Consolidator, MemoryDocs};
use adjutant_protocols::{
    ContentBlock, ImageAttachment, InboundMessage, ModelClient, ModelError, ModelRequest,
    OutboundMessage, Role, SessionKey, SessionMessage, ToolContext,
};
use adjutant_tools::ToolDispatcher;

use crate::compactor::Compactor;
use crate::debug_trace::{DebugTrace, TurnDebugRecord};
use crate::overflow::{
    classify_failure, transient_delay, FailureKind, Resolution, MAX_TRANSIENT_RETRIES,
    RESET_MESSAGE,
};
use crate::prompt::{build_system_prompt, PromptInputs};
use crate::sanitize::sanitize_history;
use crate::session_store::SessionStore;
use crate::workspace::WorkspaceContext;

/// Fixed reply for cancelled runs.
pub const STOPPED_RESPONSE: &str = "Stopped.";

const EMPTY_RESPONSE: &str = "(no text response)";

/// Silent turn injected when the context budget runs low.
const FLUSH_PROMPT: &str = "The conversation is close to the context limit and may be \
     compacted soon. If anything above matters long-term, save it now with the memory \
     tool. Do not reply to this note.";

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub turn_timeout: Duration,
    /// Attempts through the overflow resolver per run.
    pub max_attempts: u32,
    pub max_user_turns: usize,
    pub context_window_tokens: u32,
    pub flush_soft_budget_tokens: u32,
    pub max_output_tokens: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(300),
            max_attempts: 3,
            max_user_turns: 100,
            context_window_tokens: 200_000,
            flush_soft_budget_tokens: 4_000,
            max_output_tokens: 8192,
        }
    }
}

enum TurnError {
    Aborted,
    Failed(String),
}

struct RunReport {
    outbound: Option<OutboundMessage>,
    outcome: &'static str,
    error: Option<String>,
    attempts: u32,
}

/// The per-conversation reasoning-loop driver.
pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    dispatcher: Arc<ToolDispatcher>,
    sessions: Arc<SessionStore>,
    docs: MemoryDocs,
    consolidator: Arc<Consolidator>,
    compactor: Arc<Compactor>,
    workspace: Arc<WorkspaceContext>,
    debug: Arc<DebugTrace>,
    settings: OrchestratorSettings,
    locks: DashMap<SessionKey, Arc<Mutex<()>>>,
    cancellations: DashMap<SessionKey, CancellationToken>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: Arc<dyn ModelClient>,
        dispatcher: Arc<ToolDispatcher>,
        sessions: Arc<SessionStore>,
        docs: MemoryDocs,
        consolidator: Arc<Consolidator>,
        compactor: Arc<Compactor>,
        workspace: Arc<WorkspaceContext>,
        debug: Arc<DebugTrace>,
        settings: OrchestratorSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            model,
            dispatcher,
            sessions,
            docs,
            consolidator,
            compactor,
            workspace,
            debug,
            settings,
            locks: DashMap::new(),
            cancellations: DashMap::new(),
        })
    }

    /// Handle one conversation input. At most one run per session key is
    /// in flight; later calls wait for the earlier one to finish.
    pub async fn handle_message(&self, inbound: InboundMessage) -> Option<OutboundMessage> {
        self.handle_message_with(inbound, None).await
    }

    /// Like [`handle_message`](Self::handle_message), with an extra
    /// system-prompt suffix (subagent mode).
    pub async fn handle_message_with(
        &self,
        inbound: InboundMessage,
        extra_prompt: Option<String>,
    ) -> Option<OutboundMessage> {
        let key = inbound.session_key.clone();

        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let cancel = CancellationToken::new();
        self.cancellations.insert(key.clone(), cancel.clone());

        let started_at = Utc::now();
        let started = Instant::now();
        let report = self.run(&inbound, extra_prompt, &cancel).await;
        self.cancellations.remove(&key);

        self.debug
            .record(TurnDebugRecord {
                session_key: key.to_string(),
                started_at,
                duration_ms: started.elapsed().as_millis() as u64,
                outcome: report.outcome.to_string(),
                error: report.error.clone(),
                attempts: report.attempts,
            })
            .await;

        // Consolidation decision, fire-and-forget.
        let consolidator = self.consolidator.clone();
        let sessions = self.sessions.clone();
        let consolidation_key = key.clone();
        tokio::spawn(async move {
            let messages = sessions.load(&consolidation_key).await;
            consolidator.maybe_run(&consolidation_key, &messages).await;
        });

        report.outbound
    }

    /// Cancel the in-flight run for a session, if any. The run returns
    /// the fixed stopped response.
    pub fn cancel(&self, key: &SessionKey) -> bool {
        match self.cancellations.get(key) {
            Some(token) => {
                info!(session = %key, "cancelling run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Controlled reset: empty the session log.
    pub async fn reset(&self, key: &SessionKey) {
        if let Err(e) = self.sessions.truncate(key).await {
            warn!(session = %key, "reset failed: {}", e);
        }
    }

    async fn run(
        &self,
        inbound: &InboundMessage,
        extra_prompt: Option<String>,
        cancel: &CancellationToken,
    ) -> RunReport {
        let key = &inbound.session_key;

        // Repair on disk, then load.
        let mut messages = self.sessions.load(key).await;

        // Reserve-tokens write-through, then the flush decision.
        let session_settings = self.sessions.ensure_settings(key).await;
        if self.flush_due(&messages, session_settings.compaction_reserve_tokens) {
            debug!(session = %key, "injecting memory-flush turn");
            let note = SessionMessage::system(FLUSH_PROMPT).with_sender("system");
            match self.sessions.append(key, std::slice::from_ref(&note)).await {
                Ok(()) => messages.push(note),
                Err(e) => warn!(session = %key, "could not persist flush turn: {}", e),
            }
        }

        // In-memory sanitation.
        let sanitized = sanitize_history(&messages, self.settings.max_user_turns);
        if sanitized.len() < messages.len() {
            messages = sanitized;
        }

        // Inbound images normalized before anything reaches the model.
        let user_message = build_user_message(inbound);
        if let Err(e) = self
            .sessions
            .append(key, std::slice::from_ref(&user_message))
            .await
        {
            warn!(session = %key, "could not persist user turn: {}", e);
        }
        messages.push(user_message);

        let system_prompt = self.assemble_prompt(inbound, extra_prompt).await;

        let mut attempts = 0u32;
        loop {
            let new_start = messages.len();
            let turn = tokio::time::timeout(
                self.settings.turn_timeout,
                self.run_model_turn(key, &inbound.channel_id, &system_prompt, &mut messages, cancel),
            )
            .await;

            // Persist whatever this attempt appended before deciding
            // anything else.
            if let Err(e) = self.sessions.append(key, &messages[new_start..]).await {
                warn!(session = %key, "could not persist turn messages: {}", e);
            }

            let failure = match turn {
                Err(_) => {
                    warn!(session = %key, "turn hit the hard timeout");
                    return RunReport {
                        outbound: Some(OutboundMessage::text(
                            "That took longer than the time limit and was aborted.",
                        )),
                        outcome: "timeout",
                        error: Some("turn timeout".to_string()),
                        attempts: attempts + 1,
                    };
                }
                Ok(Err(TurnError::Aborted)) => {
                    return RunReport {
                        outbound: Some(OutboundMessage::text(STOPPED_RESPONSE)),
                        outcome: "stopped",
                        error: None,
                        attempts: attempts + 1,
                    };
                }
                Ok(Err(TurnError::Failed(error))) => Some(error),
                Ok(Ok(())) => None,
            };

            match failure {
                None => {
                    let outbound = extract_response(&messages[new_start..]);
                    return RunReport {
                        outbound: Some(outbound),
                        outcome: "ok",
                        error: None,
                        attempts: attempts + 1,
                    };
                }
                Some(error) => {
                    attempts += 1;
                    warn!(session = %key, attempt = attempts, "turn failed: {}", error);

                    match self.resolve_failure(key, &mut messages, &error, attempts).await {
                        Resolution::Respond(text) => {
                            return RunReport {
                                outbound: Some(OutboundMessage::text(text)),
                                outcome: "error",
                                error: Some(error),
                                attempts,
                            };
                        }
                        Resolution::Retry { delay } => {
                            if attempts >= self.settings.max_attempts {
                                return RunReport {
                                    outbound: Some(OutboundMessage::text(format!(
                                        "I could not reach the model endpoint: {}",
                                        error
                                    ))),
                                    outcome: "error",
                                    error: Some(error),
                                    attempts,
                                };
                            }
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                        }
                    }
                }
            }
        }
    }

    /// One model turn: completions and tool dispatch until the model
    /// stops asking for tools.
    async fn run_model_turn(
        &self,
        key: &SessionKey,
        channel_id: &str,
        system_prompt: &str,
        messages: &mut Vec<SessionMessage>,
        cancel: &CancellationToken,
    ) -> Result<(), TurnError> {
        loop {
            let request = ModelRequest::new(system_prompt, messages.clone())
                .with_tools(self.dispatcher.definitions())
                .with_max_tokens(self.settings.max_output_tokens);

            let response = match self.model.complete(request, cancel).await {
                Ok(response) => response,
                Err(ModelError::Aborted) => return Err(TurnError::Aborted),
                Err(e) => return Err(TurnError::Failed(e.to_string())),
            };

            let assistant = response.message;
            let stop_error = (assistant.stop_reason.as_deref() == Some("error")).then(|| {
                assistant
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "model returned an error".to_string())
            });

            let tool_uses: Vec<(String, String, serde_json::Value)> = assistant
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            messages.push(assistant);

            if let Some(error) = stop_error {
                return Err(TurnError::Failed(error));
            }
            if tool_uses.is_empty() {
                return Ok(());
            }

            let mut blocks = Vec::with_capacity(tool_uses.len());
            for (call_id, name, input) in tool_uses {
                if cancel.is_cancelled() {
                    return Err(TurnError::Aborted);
                }
                let ctx = ToolContext::new(key.clone(), self.workspace.workspace_dir.clone())
                    .with_channel(channel_id)
                    .with_cancel(cancel.clone());
                blocks.push(self.dispatcher.dispatch(&call_id, &name, input, ctx).await);
            }
            messages.push(SessionMessage::tool_results(blocks));
        }
    }

    async fn resolve_failure(
        &self,
        key: &SessionKey,
        messages: &mut Vec<SessionMessage>,
        error: &str,
        attempts: u32,
    ) -> Resolution {
        match classify_failure(error) {
            FailureKind::ContextOverflow => {
                if attempts == 1 {
                    match self.compactor.compact(&self.sessions, key, messages).await {
                        Ok(compacted) => {
                            *messages = compacted;
                            return Resolution::Retry {
                                delay: Duration::ZERO,
                            };
                        }
                        Err(e) => warn!(session = %key, "compaction failed: {}", e),
                    }
                }

                info!(session = %key, "resetting session after unrecoverable overflow");
                if let Err(e) = self.sessions.truncate(key).await {
                    warn!(session = %key, "could not truncate session: {}", e);
                }
                messages.clear();
                Resolution::Respond(RESET_MESSAGE.to_string())
            }
            FailureKind::Transient => {
                if attempts > MAX_TRANSIENT_RETRIES {
                    Resolution::Respond(format!(
                        "The model endpoint kept failing: {}",
                        error
                    ))
                } else {
                    Resolution::Retry {
                        delay: transient_delay(attempts - 1),
                    }
                }
            }
            FailureKind::Unknown => Resolution::Respond(error.to_string()),
        }
    }

    async fn assemble_prompt(
        &self,
        inbound: &InboundMessage,
        extra: Option<String>,
    ) -> String {
        let memory = self.docs.read_memory().await;

        let channel_context = if inbound.channel_id.is_empty() {
            None
        } else {
            let who = inbound
                .user_name
                .clone()
                .unwrap_or_else(|| inbound.user_id.clone());
            Some(if inbound.is_group {
                format!("Group channel {} ; latest message from {}.", inbound.channel_id, who)
            } else {
                format!("Direct conversation with {}.", who)
            })
        };

        let inputs = PromptInputs {
            memory,
            channel_context,
            is_group: inbound.is_group,
            sandbox_note: None,
            extra,
        };
        build_system_prompt(&self.workspace, &inputs)
    }

    /// Token estimate (chars / 4) against the flush threshold.
    fn flush_due(&self, messages: &[SessionMessage], reserve_tokens: u32) -> bool {
        let chars: usize = messages.iter().map(|m| m.char_count()).sum();
        let estimate = chars / 4;
        let threshold = (self.settings.context_window_tokens as usize)
            .saturating_sub(reserve_tokens as usize)
            .saturating_sub(self.settings.flush_soft_budget_tokens as usize);
        estimate >= threshold
    }
}

/// Build the user turn, normalizing attached images.
fn build_user_message(inbound: &InboundMessage) -> SessionMessage {
    let mut blocks = Vec::new();
    if !inbound.text.is_empty() {
        blocks.push(ContentBlock::text(&inbound.text));
    }

    for image in &inbound.images {
        match adjutant_media::normalize_base64(&image.data) {
            Ok(normalized) => {
                blocks.push(ContentBlock::image(normalized.to_base64(), normalized.mime_type))
            }
            Err(e) => {
                warn!("dropping undecodable inbound image: {}", e);
                blocks.push(ContentBlock::text(format!(
                    "[an attached image could not be processed: {}]",
                    e
                )));
            }
        }
    }

    if blocks.is_empty() {
        blocks.push(ContentBlock::text(""));
    }

    let mut message = SessionMessage::user_blocks(blocks);
    if !inbound.user_id.is_empty() {
        message = message.with_sender(&inbound.user_id);
    }
    message
}

/// Response text and images from the turn's appended messages: text from
/// the last assistant message, images from the whole turn (assistant
/// output plus tool results).
fn extract_response(turn_messages: &[SessionMessage]) -> OutboundMessage {
    let text = turn_messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.text())
        .unwrap_or_default();

    let mut images = Vec::new();
    for message in turn_messages {
        collect_images(&message.content, &mut images);
    }

    let text = if text.trim().is_empty() {
        EMPTY_RESPONSE.to_string()
    } else {
        text
    };

    OutboundMessage { text, images }
}

fn collect_images(blocks: &[ContentBlock], out: &mut Vec<ImageAttachment>) {
    for block in blocks {
        match block {
            ContentBlock::Image { data, mime_type } => out.push(ImageAttachment {
                data: data.clone(),
                mime_type: mime_type.clone(),
            }),
            ContentBlock::ToolResult { content, .. } => collect_images(content, out),
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
