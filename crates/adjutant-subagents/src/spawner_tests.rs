use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::*;

/// Runner that sleeps for a per-task duration parsed from the task text
/// ("sleep:<ms>:<name>"), then echoes the name.
struct SleepyRunner;

#[async_trait]
impl SubagentRunner for SleepyRunner {
    async fn run(
        &self,
        _child: SessionKey,
        task: String,
        _depth: u32,
        cancel: CancellationToken,
    ) -> Result<String, String> {
        let mut parts = task.splitn(3, ':');
        let _ = parts.next();
        let ms: u64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(10);
        let name = parts.next().unwrap_or("anon").to_string();

        tokio::select! {
            _ = cancel.cancelled() => Err("cancelled".into()),
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(format!("done {}", name)),
        }
    }
}

/// Runner that never finishes (until cancelled).
struct HangingRunner;

#[async_trait]
impl SubagentRunner for HangingRunner {
    async fn run(
        &self,
        _child: SessionKey,
        _task: String,
        _depth: u32,
        cancel: CancellationToken,
    ) -> Result<String, String> {
        cancel.cancelled().await;
        Err("cancelled".into())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    registry: Arc<SubagentRegistry>,
    spawner: Arc<SubagentSpawner>,
    announces: Arc<Mutex<Vec<AnnounceInfo>>>,
}

async fn harness(runner: Arc<dyn SubagentRunner>, limits: SubagentLimits) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(
        SubagentRegistry::open(dir.path().join("reg.json"))
            .await
            .unwrap(),
    );

    let announces: Arc<Mutex<Vec<AnnounceInfo>>> = Arc::new(Mutex::new(Vec::new()));
    let announce: AnnounceFn = {
        let announces = announces.clone();
        Arc::new(move |info| {
            let announces = announces.clone();
            Box::pin(async move {
                announces.lock().await.push(info);
            })
        })
    };

    let spawner = SubagentSpawner::new(registry.clone(), runner, announce, limits);
    Harness {
        _dir: dir,
        registry,
        spawner,
        announces,
    }
}

fn request(task: &str, parent: &str) -> SpawnRequest {
    SpawnRequest {
        task: task.to_string(),
        parent_session_key: SessionKey::new(parent),
        parent_channel_id: "chan-1".to_string(),
        label: None,
    }
}

#[tokio::test]
async fn spawn_runs_and_announces() {
    let h = harness(Arc::new(SleepyRunner), SubagentLimits::default()).await;

    let outcome = h
        .spawner
        .spawn(request("sleep:10:solo", "t:dm:1"))
        .await
        .unwrap();
    let run_id = match outcome {
        SpawnOutcome::Spawned { run_id, child_session_key } => {
            assert!(child_session_key.is_subagent());
            run_id
        }
        SpawnOutcome::Forbidden { reason } => panic!("forbidden: {}", reason),
    };

    tokio::time::sleep(Duration::from_millis(100)).await;

    let run = h.registry.get(&run_id).await.unwrap();
    assert_eq!(run.status, SubagentStatus::Ok);
    assert_eq!(run.result.as_deref(), Some("done solo"));
    assert_eq!(run.depth, 1);
    assert!(run.ended_at.unwrap() >= run.created_at);

    let announces = h.announces.lock().await;
    assert_eq!(announces.len(), 1);
    assert_eq!(announces[0].remaining_active_children, 0);
    assert!(announces[0].summary().contains("status ok"));
}

#[tokio::test]
async fn announces_arrive_in_completion_order() {
    let h = harness(Arc::new(SleepyRunner), SubagentLimits::default()).await;

    h.spawner
        .spawn(request("sleep:120:S1", "t:dm:p"))
        .await
        .unwrap();
    h.spawner
        .spawn(request("sleep:30:S2", "t:dm:p"))
        .await
        .unwrap();
    h.spawner
        .spawn(request("sleep:70:S3", "t:dm:p"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    let announces = h.announces.lock().await;
    let order: Vec<String> = announces
        .iter()
        .map(|a| a.run.result.clone().unwrap())
        .collect();
    assert_eq!(order, vec!["done S2", "done S3", "done S1"]);
    assert_eq!(announces.last().unwrap().remaining_active_children, 0);
}

#[tokio::test]
async fn per_session_child_limit_is_enforced() {
    let h = harness(Arc::new(HangingRunner), SubagentLimits::default()).await;

    for i in 0..5 {
        let outcome = h
            .spawner
            .spawn(request(&format!("task {}", i), "t:dm:p"))
            .await
            .unwrap();
        assert!(matches!(outcome, SpawnOutcome::Spawned { .. }));
    }

    let outcome = h.spawner.spawn(request("one too many", "t:dm:p")).await.unwrap();
    match outcome {
        SpawnOutcome::Forbidden { reason } => assert!(reason.contains("limit")),
        other => panic!("expected forbidden, got {:?}", other),
    }

    // Registry unchanged by the refusal.
    assert_eq!(h.registry.list().await.len(), 5);
}

#[tokio::test]
async fn global_limit_is_enforced_across_parents() {
    let limits = SubagentLimits {
        max_concurrent_total: 4,
        ..Default::default()
    };
    let h = harness(Arc::new(HangingRunner), limits).await;

    for i in 0..4 {
        let outcome = h
            .spawner
            .spawn(request("wait", &format!("t:dm:{}", i)))
            .await
            .unwrap();
        assert!(matches!(outcome, SpawnOutcome::Spawned { .. }));
    }

    let outcome = h.spawner.spawn(request("wait", "t:dm:extra")).await.unwrap();
    assert!(matches!(outcome, SpawnOutcome::Forbidden { .. }));
}

#[tokio::test]
async fn depth_limit_blocks_grandchildren_of_grandchildren() {
    let h = harness(Arc::new(HangingRunner), SubagentLimits::default()).await;

    // A child at depth 1 can spawn (depth 2)...
    let outcome = h.spawner.spawn(request("lvl1", "t:dm:root")).await.unwrap();
    let child_key = match outcome {
        SpawnOutcome::Spawned { child_session_key, .. } => child_session_key,
        other => panic!("{:?}", other),
    };

    let outcome = h
        .spawner
        .spawn(SpawnRequest {
            task: "lvl2".into(),
            parent_session_key: child_key,
            parent_channel_id: "chan".into(),
            label: None,
        })
        .await
        .unwrap();
    let grandchild_key = match outcome {
        SpawnOutcome::Spawned { child_session_key, .. } => child_session_key,
        other => panic!("{:?}", other),
    };

    // ...but the depth-2 session cannot go deeper.
    let outcome = h
        .spawner
        .spawn(SpawnRequest {
            task: "lvl3".into(),
            parent_session_key: grandchild_key,
            parent_channel_id: "chan".into(),
            label: None,
        })
        .await
        .unwrap();
    match outcome {
        SpawnOutcome::Forbidden { reason } => assert!(reason.contains("depth")),
        other => panic!("expected forbidden, got {:?}", other),
    }
}

#[tokio::test]
async fn kill_transitions_to_killed_without_announce() {
    let h = harness(Arc::new(HangingRunner), SubagentLimits::default()).await;

    let outcome = h.spawner.spawn(request("wait", "t:dm:p")).await.unwrap();
    let run_id = match outcome {
        SpawnOutcome::Spawned { run_id, .. } => run_id,
        other => panic!("{:?}", other),
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    let killed = h.spawner.kill(&run_id).await.unwrap();
    assert_eq!(killed.status, SubagentStatus::Killed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.announces.lock().await.is_empty());
    assert_eq!(h.registry.active_total().await, 0);
}

#[tokio::test]
async fn failing_child_announces_error() {
    struct FailingRunner;

    #[async_trait]
    impl SubagentRunner for FailingRunner {
        async fn run(
            &self,
            _child: SessionKey,
            _task: String,
            _depth: u32,
            _cancel: CancellationToken,
        ) -> Result<String, String> {
            Err("model exploded".into())
        }
    }

    let h = harness(Arc::new(FailingRunner), SubagentLimits::default()).await;
    h.spawner.spawn(request("doomed", "t:dm:p")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let announces = h.announces.lock().await;
    assert_eq!(announces.len(), 1);
    assert_eq!(announces[0].run.status, SubagentStatus::Error);
    assert!(announces[0].summary().contains("status error"));
    assert!(announces[0].run.result.is_some());
}
