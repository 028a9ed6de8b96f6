//! Proactive heartbeat.
//!
//! Wakes the agent on a period, feeds it workspace context (memory
//! head, history tail, TODO list) and delivers whatever it decides to
//! say via the first available transport. A persisted minimum interval
//! holds across restarts; a tick that lands while a previous heartbeat
//! is still running is skipped outright.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use adjutant_memory::MemoryDocs;
use adjutant_protocols::{InboundMessage, OutboundMessage, SessionKey};

use crate::orchestrator::Orchestrator;

/// Heartbeat tuning.
#[derive(Debug, Clone)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    /// Floor between successive fires, persisted across restarts.
    pub min_interval: Duration,
    /// Transport whose session key namespaces heartbeat history.
    pub transport_id: String,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            min_interval: Duration::from_secs(10 * 60),
            transport_id: "default".to_string(),
        }
    }
}

/// Durable heartbeat state (`heartbeat-state.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<i64>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Delivery callback: hand the outbound to the first available
/// transport.
pub type DeliverFn = Arc<dyn Fn(OutboundMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// The heartbeat service.
pub struct HeartbeatService {
    orchestrator: Arc<Orchestrator>,
    docs: MemoryDocs,
    workspace_dir: PathBuf,
    state_path: PathBuf,
    settings: HeartbeatSettings,
    deliver: DeliverFn,
    in_flight: AtomicBool,
    shutdown: CancellationToken,
}

impl HeartbeatService {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        docs: MemoryDocs,
        workspace_dir: impl AsRef<Path>,
        state_dir: impl AsRef<Path>,
        settings: HeartbeatSettings,
        deliver: DeliverFn,
    ) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            docs,
            workspace_dir: workspace_dir.as_ref().to_path_buf(),
            state_path: state_dir.as_ref().join("heartbeat-state.json"),
            settings,
            deliver,
            in_flight: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    /// Start the periodic driver.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + this.settings.interval,
                this.settings.interval,
            );
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(
                interval_secs = this.settings.interval.as_secs(),
                "heartbeat started"
            );
            loop {
                tokio::select! {
                    _ = this.shutdown.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                this.fire().await;
            }
        });
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// One heartbeat: coalesce, honor the floor, run, persist, deliver.
    pub async fn fire(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("heartbeat still running; skipping tick");
            return;
        }

        let result = self.fire_inner().await;
        self.in_flight.store(false, Ordering::SeqCst);
        if let Err(e) = result {
            warn!("heartbeat failed: {}", e);
        }
    }

    async fn fire_inner(&self) -> Result<(), String> {
        let mut state = self.load_state().await;

        let now_ms = Utc::now().timestamp_millis();
        if let Some(last) = state.last_run_at_ms {
            let elapsed_ms = now_ms.saturating_sub(last);
            if (elapsed_ms as u128) < self.settings.min_interval.as_millis() {
                debug!("heartbeat under the minimum interval; skipping");
                return Ok(());
            }
        }

        let prompt = self.build_prompt().await;
        let inbound = InboundMessage {
            text: prompt,
            session_key: SessionKey::for_heartbeat(&self.settings.transport_id),
            channel_id: String::new(),
            user_id: "system".to_string(),
            user_name: None,
            is_group: false,
            images: Vec::new(),
        };

        let outcome = self.orchestrator.handle_message(inbound).await;

        state.last_run_at_ms = Some(Utc::now().timestamp_millis());
        state.run_count += 1;
        state.last_error = None;
        self.save_state(state).await?;

        if let Some(out) = outcome {
            if !out.is_suppressed() {
                (self.deliver)(out).await;
            }
        }
        Ok(())
    }

    /// Workspace context prefix plus the wake-up framing.
    async fn build_prompt(&self) -> String {
        let mut sections = vec![
            "This is a periodic proactive wake-up, not a user message. Review the \
             context below; if something deserves attention (a due task, a follow-up, \
             something promised), act on it or send a short note. If nothing needs \
             doing, reply with exactly NO_REPLY."
                .to_string(),
        ];

        if let Some(memory) = self.docs.memory_head(4_000).await {
            sections.push(format!("MEMORY.md:\n{}", memory));
        }
        if let Some(history) = self.docs.history_tail(20).await {
            sections.push(format!("Recent events:\n{}", history));
        }
        if let Ok(todo) = fs::read_to_string(self.workspace_dir.join("TODO.md")).await {
            sections.push(format!("TODO.md:\n{}", todo));
        }

        sections.join("\n\n")
    }

    async fn load_state(&self) -> HeartbeatState {
        match fs::read_to_string(&self.state_path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => HeartbeatState::default(),
        }
    }

    async fn save_state(&self, state: HeartbeatState) -> Result<(), String> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| e.to_string())?;
        }
        let tmp = self.state_path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string(&state).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| e.to_string())?;
        fs::rename(&tmp, &self.state_path)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
