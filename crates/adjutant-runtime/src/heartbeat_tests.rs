use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use adjutant_memory::{Consolidator, ConsolidatorSettings, ConsolidationStateStore};
use adjutant_protocols::{ModelClient, ModelError, ModelRequest, ModelResponse, SessionMessage};
use adjutant_tools::{ToolDispatcher, ToolRegistry};

use crate::compactor::Compactor;
use crate::debug_trace::DebugTrace;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::session_store::SessionStore;
use crate::workspace::WorkspaceContext;

use super::*;

/// Model that counts calls, sleeps a bit, and replies with a fixed text.
struct CountingModel {
    calls: AtomicUsize,
    delay: Duration,
    reply: String,
}

impl CountingModel {
    fn new(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            reply: reply.to_string(),
        })
    }
}

#[async_trait]
impl ModelClient for CountingModel {
    async fn complete(
        &self,
        _request: ModelRequest,
        _cancel: &CancellationToken,
    ) -> Result<ModelResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(ModelResponse {
            message: SessionMessage::assistant(self.reply.clone()),
        })
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    service: Arc<HeartbeatService>,
    model: Arc<CountingModel>,
    delivered: Arc<tokio::sync::Mutex<Vec<String>>>,
    state_dir: PathBuf,
}

async fn fixture(reply: &str, delay: Duration, settings: HeartbeatSettings) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let workspace_dir = dir.path().join("workspace");

    let model = CountingModel::new(reply, delay);
    let sessions = Arc::new(SessionStore::new(&state_dir));
    let docs = MemoryDocs::new(&workspace_dir);
    let orchestrator = Orchestrator::new(
        model.clone(),
        Arc::new(ToolDispatcher::new(Arc::new(ToolRegistry::new()))),
        sessions,
        docs.clone(),
        Arc::new(Consolidator::new(
            model.clone(),
            docs.clone(),
            ConsolidationStateStore::new(&state_dir),
            ConsolidatorSettings {
                threshold: 10_000,
                ..Default::default()
            },
        )),
        Arc::new(Compactor::new(model.clone())),
        Arc::new(WorkspaceContext::load(&workspace_dir).await),
        Arc::new(DebugTrace::open(&state_dir).await),
        OrchestratorSettings::default(),
    );

    let delivered: Arc<tokio::sync::Mutex<Vec<String>>> =
        Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let deliver: DeliverFn = {
        let delivered = delivered.clone();
        Arc::new(move |out| {
            let delivered = delivered.clone();
            Box::pin(async move {
                delivered.lock().await.push(out.text);
            })
        })
    };

    let service = HeartbeatService::new(
        orchestrator,
        docs,
        &workspace_dir,
        &state_dir,
        settings,
        deliver,
    );

    Fixture {
        _dir: dir,
        service,
        model,
        delivered,
        state_dir,
    }
}

fn fast_settings() -> HeartbeatSettings {
    HeartbeatSettings {
        interval: Duration::from_millis(50),
        min_interval: Duration::from_millis(200),
        transport_id: "test".to_string(),
    }
}

#[tokio::test]
async fn fire_runs_and_delivers() {
    let f = fixture("time to water the plants", Duration::ZERO, fast_settings()).await;

    f.service.fire().await;

    assert_eq!(f.model.calls.load(Ordering::SeqCst), 1);
    let delivered = f.delivered.lock().await;
    assert_eq!(delivered.as_slice(), ["time to water the plants"]);

    let state: HeartbeatState = serde_json::from_str(
        &tokio::fs::read_to_string(f.state_dir.join("heartbeat-state.json"))
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(state.run_count, 1);
    assert!(state.last_run_at_ms.is_some());
}

#[tokio::test]
async fn minimum_interval_skips_early_fires() {
    let f = fixture("hello", Duration::ZERO, fast_settings()).await;

    f.service.fire().await;
    f.service.fire().await; // immediately after; inside the floor

    assert_eq!(f.model.calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    f.service.fire().await;
    assert_eq!(f.model.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn minimum_interval_holds_across_restarts() {
    let f = fixture("hello", Duration::ZERO, fast_settings()).await;

    // Simulate a previous process that fired just before this one
    // started: only the persisted state carries that knowledge.
    let state = HeartbeatState {
        last_run_at_ms: Some(chrono::Utc::now().timestamp_millis()),
        run_count: 5,
        last_error: None,
    };
    tokio::fs::create_dir_all(&f.state_dir).await.unwrap();
    tokio::fs::write(
        f.state_dir.join("heartbeat-state.json"),
        serde_json::to_string(&state).unwrap(),
    )
    .await
    .unwrap();

    f.service.fire().await;
    assert_eq!(f.model.calls.load(Ordering::SeqCst), 0, "floor held");
}

#[tokio::test]
async fn no_reply_is_not_delivered() {
    let f = fixture("NO_REPLY", Duration::ZERO, fast_settings()).await;

    f.service.fire().await;

    assert_eq!(f.model.calls.load(Ordering::SeqCst), 1);
    assert!(f.delivered.lock().await.is_empty());
}

#[tokio::test]
async fn concurrent_fires_coalesce() {
    let mut settings = fast_settings();
    settings.min_interval = Duration::ZERO;
    let f = fixture("slow reply", Duration::from_millis(150), settings).await;

    let first = {
        let service = f.service.clone();
        tokio::spawn(async move { service.fire().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    f.service.fire().await; // lands while the first is still running

    first.await.unwrap();
    assert_eq!(f.model.calls.load(Ordering::SeqCst), 1, "tick skipped, not queued");
}
