//! Component wiring and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tracing::{error, info, warn};

use adjutant_config::{Config, ConfigValidator};
use adjutant_memory::{
    Consolidator, ConsolidatorSettings, ConsolidationStateStore, MemoryDocs, MemoryStore,
};
use adjutant_protocols::{
    InboundMessage, MessageHandler, OutboundMessage, SessionKey, Transport, TransportCommand,
};
use adjutant_runtime::{
    Compactor, DebugTrace, DeliverFn, HeartbeatService, HeartbeatSettings, Orchestrator,
    OrchestratorRunner, OrchestratorSettings, SessionStore, WorkspaceContext,
};
use adjutant_scheduler::{JobPayload, JobStore, OnFire, Scheduler, SchedulerSettings};
use adjutant_subagents::{
    AnnounceFn, SubagentLimits, SubagentRegistry, SubagentSpawner,
};
use adjutant_tools::builtin::{
    CronTool, ExecTool, FsListTool, FsReadTool, FsWriteTool, MemoryTool, SubagentTool,
    WebFetchTool,
};
use adjutant_tools::{LocalExec, ToolDispatcher, ToolRegistry};

use crate::model_client::HttpModelClient;
use crate::stdio_transport::StdioTransport;

/// The set of started transports; delivery routes by session-key
/// prefix.
struct TransportSet {
    transports: Vec<Arc<dyn Transport>>,
}

impl TransportSet {
    fn first_id(&self) -> String {
        self.transports
            .first()
            .map(|t| t.id().to_string())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Deliver to the transport owning the session key. Key shape is
    /// `<transport>:<scope>:<id>`; the id doubles as the channel.
    async fn deliver(&self, session_key: &SessionKey, message: OutboundMessage) {
        if message.is_suppressed() {
            return;
        }
        let mut parts = session_key.as_str().splitn(3, ':');
        let transport_id = parts.next().unwrap_or_default();
        let _scope = parts.next();
        let channel = parts.next().unwrap_or_default();

        let Some(transport) = self.transports.iter().find(|t| t.id() == transport_id) else {
            warn!(session = %session_key, "no transport for delivery");
            return;
        };
        if let Err(e) = transport.send_to_channel(channel, message).await {
            warn!(session = %session_key, "delivery failed: {}", e);
        }
    }

    /// Deliver via the first available transport.
    async fn deliver_first(&self, message: OutboundMessage) {
        if message.is_suppressed() {
            return;
        }
        let Some(transport) = self.transports.first() else {
            return;
        };
        if let Err(e) = transport.send_to_channel("", message).await {
            warn!("delivery failed: {}", e);
        }
    }
}

/// Routes transport events into the orchestrator and answers the short
/// command set.
struct RuntimeHandler {
    orchestrator: Arc<Orchestrator>,
    scheduler: Arc<Scheduler>,
    subagents: Arc<SubagentRegistry>,
}

#[async_trait]
impl MessageHandler for RuntimeHandler {
    async fn on_message(&self, inbound: InboundMessage) -> Option<OutboundMessage> {
        self.orchestrator.handle_message(inbound).await
    }

    async fn on_command(
        &self,
        command: TransportCommand,
        inbound: InboundMessage,
    ) -> Option<OutboundMessage> {
        let key = &inbound.session_key;
        let text = match command {
            TransportCommand::Stop => {
                if self.orchestrator.cancel(key) {
                    "Stopping the current run.".to_string()
                } else {
                    "Nothing is running.".to_string()
                }
            }
            TransportCommand::Reset => {
                self.orchestrator.reset(key).await;
                "Session history cleared.".to_string()
            }
            TransportCommand::Status => {
                let jobs = self.scheduler.list_jobs().await;
                let enabled = jobs.iter().filter(|j| j.enabled).count();
                let active = self.subagents.active_total().await;
                format!(
                    "jobs: {} ({} enabled) | active subagents: {}",
                    jobs.len(),
                    enabled,
                    active
                )
            }
            TransportCommand::Help => {
                "Commands: /stop (cancel the current run), /reset (clear this \
                 conversation), /status, /help. Anything else goes to the assistant."
                    .to_string()
            }
        };
        Some(OutboundMessage::text(text))
    }
}

/// Build everything from config and run until ctrl-c.
pub(crate) async fn run(config: Config) -> anyhow::Result<()> {
    let validation = ConfigValidator::validate(&config);
    for warning in &validation.warnings {
        warn!("config: {}: {}", warning.path, warning.message);
    }
    if !validation.is_valid() {
        for error in &validation.errors {
            error!("config: {}: {}", error.path, error.message);
        }
        bail!("configuration is unusable; fix the errors above");
    }

    let state_dir = &config.paths.state_dir;
    let workspace_dir = &config.paths.workspace_dir;
    tokio::fs::create_dir_all(state_dir)
        .await
        .with_context(|| format!("creating state dir {:?}", state_dir))?;
    tokio::fs::create_dir_all(workspace_dir)
        .await
        .with_context(|| format!("creating workspace dir {:?}", workspace_dir))?;

    // Core stores and caches.
    let model = HttpModelClient::new(&config.model.api_key, &config.model.model);
    let sessions = Arc::new(SessionStore::new(state_dir));
    let docs = MemoryDocs::new(workspace_dir);
    let memory_store = Arc::new(
        MemoryStore::open(workspace_dir.join("memory").join("memory.json"))
            .await
            .context("opening memory store")?,
    );
    let workspace = Arc::new(WorkspaceContext::load(workspace_dir).await);
    let debug = Arc::new(DebugTrace::open(state_dir).await);

    let consolidator = Arc::new(Consolidator::new(
        model.clone(),
        docs.clone(),
        ConsolidationStateStore::new(state_dir),
        ConsolidatorSettings {
            enabled: config.consolidation.enabled,
            threshold: config.consolidation.threshold,
            ..Default::default()
        },
    ));
    let compactor = Arc::new(Compactor::new(model.clone()));

    // Tools and the orchestrator. The cron and subagent tools register
    // after their services exist; the registry is shared and dynamic.
    let registry = Arc::new(ToolRegistry::new());
    let dispatcher = Arc::new(ToolDispatcher::new(registry.clone()));

    let orchestrator = Orchestrator::new(
        model.clone(),
        dispatcher,
        sessions.clone(),
        docs.clone(),
        consolidator,
        compactor,
        workspace,
        debug,
        OrchestratorSettings {
            turn_timeout: Duration::from_secs(config.orchestrator.turn_timeout_secs),
            max_attempts: config.orchestrator.max_attempts,
            max_user_turns: config.orchestrator.max_user_turns,
            context_window_tokens: config.model.context_window_tokens,
            flush_soft_budget_tokens: config.orchestrator.flush_soft_budget_tokens,
            max_output_tokens: config.model.max_tokens,
        },
    );

    // Transports.
    let mut started: Vec<Arc<dyn Transport>> = Vec::new();
    if config
        .transports
        .get("stdio")
        .map(|t| t.enabled)
        .unwrap_or(false)
    {
        started.push(StdioTransport::new());
    }
    let transports = Arc::new(TransportSet {
        transports: started,
    });

    // Scheduler: firings run an agent turn on an isolated cron session,
    // then deliver to the job's target.
    let job_store = Arc::new(
        JobStore::open(state_dir.join("cron-store.json"))
            .await
            .context("opening cron store")?,
    );
    let on_fire: OnFire = {
        let orchestrator = orchestrator.clone();
        let transports = transports.clone();
        Arc::new(move |job| {
            let orchestrator = orchestrator.clone();
            let transports = transports.clone();
            Box::pin(async move {
                let text = match &job.payload {
                    JobPayload::AgentTurn { message } => message.clone(),
                    JobPayload::SystemEvent { text } => {
                        format!("[scheduled event] {}", text)
                    }
                };
                let inbound = InboundMessage {
                    text,
                    session_key: SessionKey::for_cron(&job.id),
                    channel_id: String::new(),
                    user_id: "system".to_string(),
                    user_name: None,
                    is_group: false,
                    images: Vec::new(),
                };

                match orchestrator.handle_message(inbound).await {
                    Some(out) => {
                        transports.deliver(&job.session_key, out).await;
                        Ok(())
                    }
                    None => Err("job turn produced no outcome".to_string()),
                }
            })
        })
    };
    let scheduler = Scheduler::new(
        job_store,
        SchedulerSettings {
            max_concurrency: config.scheduler.max_concurrency,
            max_retries: config.scheduler.max_retries,
            retry_base_delay: Duration::from_millis(config.scheduler.retry_base_delay_ms),
            max_consecutive_failures: config.scheduler.max_consecutive_failures,
            job_timeout: Duration::from_secs(config.scheduler.job_timeout_secs),
            safety_tick: Duration::from_secs(60),
        },
        on_fire,
    );

    // Subagents: completions come back to the parent as synthetic
    // inputs from "system".
    let subagent_registry = Arc::new(
        SubagentRegistry::open(state_dir.join("subagent-registry.json"))
            .await
            .context("opening subagent registry")?,
    );
    let announce: AnnounceFn = {
        let orchestrator = orchestrator.clone();
        let transports = transports.clone();
        Arc::new(move |info| {
            let orchestrator = orchestrator.clone();
            let transports = transports.clone();
            Box::pin(async move {
                let parent = info.run.parent_session_key.clone();
                let inbound = InboundMessage {
                    text: info.summary(),
                    session_key: parent.clone(),
                    channel_id: info.run.parent_channel_id.clone(),
                    user_id: "system".to_string(),
                    user_name: None,
                    is_group: false,
                    images: Vec::new(),
                };
                if let Some(out) = orchestrator.handle_message(inbound).await {
                    transports.deliver(&parent, out).await;
                }
            })
        })
    };
    let limits = SubagentLimits {
        max_depth: config.subagents.max_depth,
        max_children_per_session: config.subagents.max_children_per_session,
        max_concurrent_total: config.subagents.max_concurrent_total,
    };
    let spawner = SubagentSpawner::new(
        subagent_registry.clone(),
        Arc::new(OrchestratorRunner::new(
            orchestrator.clone(),
            config.subagents.max_depth,
        )),
        announce,
        limits,
    );

    // Builtin tools.
    registry.register(Arc::new(FsReadTool::new()));
    registry.register(Arc::new(FsWriteTool::new()));
    registry.register(Arc::new(FsListTool::new()));
    registry.register(Arc::new(ExecTool::new(Arc::new(LocalExec))));
    registry.register(Arc::new(WebFetchTool::new()));
    registry.register(Arc::new(MemoryTool::new(memory_store)));
    registry.register(Arc::new(CronTool::new(scheduler.clone())));
    registry.register(Arc::new(SubagentTool::new(spawner.clone())));
    info!("registered {} tools", registry.len());

    // Start everything.
    let handler: Arc<dyn MessageHandler> = Arc::new(RuntimeHandler {
        orchestrator: orchestrator.clone(),
        scheduler: scheduler.clone(),
        subagents: subagent_registry.clone(),
    });
    for transport in &transports.transports {
        transport
            .start(handler.clone())
            .await
            .with_context(|| format!("starting transport {}", transport.id()))?;
    }

    scheduler.start().await;

    let heartbeat = if config.heartbeat.enabled {
        let deliver: DeliverFn = {
            let transports = transports.clone();
            Arc::new(move |out: OutboundMessage| {
                let transports = transports.clone();
                Box::pin(async move { transports.deliver_first(out).await })
            })
        };
        let service = HeartbeatService::new(
            orchestrator.clone(),
            docs,
            workspace_dir,
            state_dir,
            HeartbeatSettings {
                interval: Duration::from_secs(config.heartbeat.interval_mins * 60),
                min_interval: Duration::from_secs(config.heartbeat.min_interval_mins * 60),
                transport_id: transports.first_id(),
            },
            deliver,
        );
        service.start();
        Some(service)
    } else {
        None
    };

    // Periodic registry hygiene.
    let cleanup_registry = subagent_registry.clone();
    let cleanup = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(600));
        loop {
            ticker.tick().await;
            if let Err(e) = cleanup_registry.cleanup().await {
                warn!("subagent cleanup failed: {}", e);
            }
        }
    });

    info!("adjutant is up");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");

    cleanup.abort();
    if let Some(heartbeat) = heartbeat {
        heartbeat.stop();
    }
    for transport in &transports.transports {
        if let Err(e) = transport.stop().await {
            warn!("transport {} stop failed: {}", transport.id(), e);
        }
    }
    scheduler.stop().await;

    Ok(())
}
