//! End-to-end scenarios against a real coordinator HTTP server plus a real
//! `Worker` driving it, per the scenarios catalogued in the core's testable
//! properties section (happy path, auth rejection, worker staleness).

use std::sync::Arc;
use std::time::Duration;

use dispatch_engine::coordinator::CoordinatorConfig;
use dispatch_engine::worker::{VisitProcessor, Worker, WorkerConfig};
use dispatch_engine::{Task, VisitResult};
use tokio_util::sync::CancellationToken;

struct AlwaysSucceeds;

#[async_trait::async_trait]
impl VisitProcessor for AlwaysSucceeds {
    async fn process(&self, _task: &Task) -> VisitResult {
        VisitResult::success(200, Duration::from_millis(100))
    }
}

async fn wait_for_stats<F>(base: &str, client: &reqwest::Client, mut done: F) -> serde_json::Value
where
    F: FnMut(&serde_json::Value) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let stats: serde_json::Value = client
            .get(format!("{base}/api/v1/master/stats"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if done(&stats) || tokio::time::Instant::now() >= deadline {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// S1 — happy path: submit one task, a worker with a canned-success
/// processor drains it, stats converge on one completed task.
#[tokio::test]
async fn happy_path_completes_submitted_task() {
    let bind_addr = "127.0.0.1:18080".to_string();
    let coordinator_cfg = CoordinatorConfig { bind_addr: bind_addr.clone(), ..CoordinatorConfig::default() };
    let cancel = CancellationToken::new();

    let server_cancel = cancel.clone();
    let server = tokio::spawn(dispatch_engine::coordinator::serve(coordinator_cfg, server_cancel));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let base = format!("http://{bind_addr}");
    let client = reqwest::Client::new();
    let submit = serde_json::json!({"url": "http://example.com", "session_id": "s1"});
    let resp = client
        .post(format!("{base}/api/v1/master/task/submit"))
        .json(&submit)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let worker_cfg = WorkerConfig { master_url: base.clone(), max_concurrency: 1, ..WorkerConfig::default() };
    let worker = Worker::new(worker_cfg, Arc::new(AlwaysSucceeds)).unwrap();
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    let stats = wait_for_stats(&base, &client, |s| s["completed_tasks"].as_u64() == Some(1)).await;
    assert_eq!(stats["total_tasks"], 1);
    assert_eq!(stats["completed_tasks"], 1);
    assert_eq!(stats["failed_tasks"], 0);
    assert_eq!(stats["active_workers"], 1);

    cancel.cancel();
    let _ = worker_handle.await;
    let _ = server.await;
}

/// S2 — auth rejection: missing/bad/correct bearer tokens against a
/// protected GET endpoint.
#[tokio::test]
async fn auth_rejection_on_protected_endpoint() {
    let bind_addr = "127.0.0.1:18081".to_string();
    let coordinator_cfg = CoordinatorConfig {
        bind_addr: bind_addr.clone(),
        secret_key: "s".to_string(),
        ..CoordinatorConfig::default()
    };
    let cancel = CancellationToken::new();
    let server = tokio::spawn(dispatch_engine::coordinator::serve(coordinator_cfg, cancel.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let base = format!("http://{bind_addr}");
    let client = reqwest::Client::new();

    let no_header = client.get(format!("{base}/api/v1/master/workers")).send().await.unwrap();
    assert_eq!(no_header.status(), 401);

    let wrong = client
        .get(format!("{base}/api/v1/master/workers"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let correct = client
        .get(format!("{base}/api/v1/master/workers"))
        .bearer_auth("s")
        .send()
        .await
        .unwrap();
    assert_eq!(correct.status(), 200);
    let body: Vec<serde_json::Value> = correct.json().await.unwrap();
    assert!(body.is_empty());

    cancel.cancel();
    let _ = server.await;
}

/// S6 — worker staleness: a registered worker stops heartbeating and is
/// swept to Offline within `2 * HeartbeatInterval`.
#[tokio::test]
async fn stale_worker_flips_offline_and_drops_from_healthy() {
    let bind_addr = "127.0.0.1:18082".to_string();
    let coordinator_cfg = CoordinatorConfig {
        bind_addr: bind_addr.clone(),
        heartbeat_interval: Duration::from_millis(200),
        ..CoordinatorConfig::default()
    };
    let cancel = CancellationToken::new();
    let server = tokio::spawn(dispatch_engine::coordinator::serve(coordinator_cfg, cancel.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let base = format!("http://{bind_addr}");
    let client = reqwest::Client::new();
    let info = serde_json::json!({
        "id": "w-stale",
        "hostname": "h",
        "version": "0.1.0",
        "max_concurrency": 1,
        "active_tasks": 0,
        "total_tasks": 0,
        "success_count": 0,
        "failed_count": 0,
        "last_heartbeat": chrono::Utc::now().to_rfc3339(),
        "status": "Active",
    });
    let resp = client
        .post(format!("{base}/api/v1/worker/register"))
        .json(&info)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    tokio::time::sleep(Duration::from_millis(600)).await;

    let workers: Vec<serde_json::Value> =
        client.get(format!("{base}/api/v1/master/workers")).send().await.unwrap().json().await.unwrap();
    let w = workers.iter().find(|w| w["id"] == "w-stale").unwrap();
    assert_eq!(w["status"], "Offline");

    cancel.cancel();
    let _ = server.await;
}
