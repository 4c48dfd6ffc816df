//! Route handlers for the Coordinator's HTTP surface (§6). Handlers take
//! `CoordinatorState` through axum's `State` extractor — the explicit
//! dependency injection §9 calls for in place of globals.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use super::auth::require_bearer_auth;
use super::dto::{
    HeartbeatRequest, MasterStats, RegisteredResponse, SubmittedResponse, TaskCompletePayload,
    TaskFailPayload, TaskListQuery, TaskRequestPayload,
};
use super::error::CoordinatorError;
use super::json::Json as ReqJson;
use super::state::CoordinatorState;
use crate::task::{Task, TaskStatus};
use crate::task_queue::{DequeueOutcome, QueueError};
use crate::worker_info::WorkerInfo;

/// Builds the full router: an unauthenticated `status` route merged with
/// every other endpoint behind [`require_bearer_auth`] (§4.4 step 1).
#[must_use]
pub fn build_router(state: CoordinatorState) -> Router {
    let authenticated = Router::new()
        .route("/api/v1/worker/register", post(register_worker))
        .route("/api/v1/worker/heartbeat", post(heartbeat))
        .route("/api/v1/worker/task/request", post(task_request))
        .route("/api/v1/worker/task/complete", post(task_complete))
        .route("/api/v1/worker/task/fail", post(task_fail))
        .route("/api/v1/master/task/submit", post(submit_task))
        .route("/api/v1/master/workers", get(list_workers))
        .route("/api/v1/master/tasks", get(list_tasks))
        .route("/api/v1/master/stats", get(stats))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_bearer_auth));

    Router::new()
        .route("/api/v1/master/status", get(status))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn compute_stats(state: &CoordinatorState) -> MasterStats {
    MasterStats {
        total_tasks: state.index.total(),
        completed_tasks: state.index.count(TaskStatus::Completed),
        failed_tasks: state.index.count(TaskStatus::Failed),
        pending_tasks: state.index.count(TaskStatus::Pending),
        active_workers: state.registry.active_count(),
    }
}

fn parse_status_filter(raw: &str) -> Option<TaskStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Some(TaskStatus::Pending),
        "assigned" => Some(TaskStatus::Assigned),
        "running" => Some(TaskStatus::Running),
        "completed" => Some(TaskStatus::Completed),
        "failed" => Some(TaskStatus::Failed),
        _ => None,
    }
}

async fn register_worker(State(state): State<CoordinatorState>, ReqJson(info): ReqJson<WorkerInfo>) -> impl IntoResponse {
    let worker_id = info.id.clone();
    state.registry.register(info);
    Json(RegisteredResponse { status: "registered".to_string(), worker_id })
}

async fn heartbeat(State(state): State<CoordinatorState>, ReqJson(req): ReqJson<HeartbeatRequest>) -> StatusCode {
    state.registry.heartbeat(&req.worker_id, req.counters);
    StatusCode::OK
}

/// §4.4 step 3: bounded wait on the queue, Assigned transition on success,
/// distinct "no task available" (204) on timeout.
async fn task_request(State(state): State<CoordinatorState>, ReqJson(req): ReqJson<TaskRequestPayload>) -> Response {
    match state.queue.dequeue(state.config.task_request_wait).await {
        DequeueOutcome::Task(task) => {
            state.index.mark_assigned(&task.id, &req.worker_id);
            let task = state.index.get(&task.id).unwrap_or(task);
            (StatusCode::OK, Json(task)).into_response()
        }
        DequeueOutcome::Empty | DequeueOutcome::Cancelled => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn task_complete(State(state): State<CoordinatorState>, ReqJson(payload): ReqJson<TaskCompletePayload>) -> StatusCode {
    state.index.mark_completed(&payload.task_id, payload.result);
    StatusCode::OK
}

async fn task_fail(State(state): State<CoordinatorState>, ReqJson(payload): ReqJson<TaskFailPayload>) -> StatusCode {
    state.index.mark_failed(&payload.task_id, payload.error);
    StatusCode::OK
}

/// §4.4 step 2: submission. A `QueueFull` rejection must not retain the task
/// in the index, so the task is only inserted after a successful enqueue.
async fn submit_task(State(state): State<CoordinatorState>, ReqJson(task): ReqJson<Task>) -> Result<Json<SubmittedResponse>, CoordinatorError> {
    let submitted = Task::submitted(task);
    match state.queue.enqueue(submitted.clone()) {
        Ok(()) => {
            let task_id = submitted.id.clone();
            state.index.insert_pending(submitted);
            Ok(Json(SubmittedResponse { status: "submitted".to_string(), task_id }))
        }
        Err(QueueError::Full) => Err(CoordinatorError::QueueFull),
    }
}

async fn status(State(state): State<CoordinatorState>) -> Json<MasterStats> {
    Json(compute_stats(&state))
}

async fn stats(State(state): State<CoordinatorState>) -> Json<MasterStats> {
    Json(compute_stats(&state))
}

async fn list_workers(State(state): State<CoordinatorState>) -> Json<Vec<WorkerInfo>> {
    Json(state.registry.list_all())
}

async fn list_tasks(State(state): State<CoordinatorState>, Query(query): Query<TaskListQuery>) -> Json<Vec<Task>> {
    let filter = query.status.as_deref().and_then(parse_status_filter);
    Json(state.index.list(filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::coordinator::config::CoordinatorConfig;

    fn router_with_secret(secret: &str) -> Router {
        let config = CoordinatorConfig { secret_key: secret.to_string(), ..CoordinatorConfig::default() };
        build_router(CoordinatorState::new(config))
    }

    #[tokio::test]
    async fn status_is_reachable_without_auth() {
        let router = router_with_secret("s3cret");
        let resp = router
            .oneshot(Request::get("/api/v1/master/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn workers_without_auth_header_is_rejected() {
        let router = router_with_secret("s3cret");
        let resp = router
            .oneshot(Request::get("/api/v1/master/workers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn workers_with_correct_bearer_succeeds() {
        let router = router_with_secret("s3cret");
        let resp = router
            .oneshot(
                Request::get("/api/v1/master/workers")
                    .header("Authorization", "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"[]");
    }

    #[tokio::test]
    async fn submit_then_request_assigns_task() {
        let router = router_with_secret("");
        let submit_body = serde_json::json!({"url": "http://example.com", "session_id": "s1"});
        let resp = router
            .clone()
            .oneshot(
                Request::post("/api/v1/master/task/submit")
                    .header("content-type", "application/json")
                    .body(Body::from(submit_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req_body = serde_json::json!({"worker_id": "w1"});
        let resp = router
            .oneshot(
                Request::post("/api/v1/worker/task/request")
                    .header("content-type", "application/json")
                    .body(Body::from(req_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let task: Task = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.worker_id.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn queue_full_submission_returns_500_and_is_not_retained() {
        let config = CoordinatorConfig { queue_capacity: 1, ..CoordinatorConfig::default() };
        let router = build_router(CoordinatorState::new(config));
        let body = serde_json::json!({"url": "http://example.com", "session_id": "s1"});

        let first = router
            .clone()
            .oneshot(
                Request::post("/api/v1/master/task/submit")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = router
            .oneshot(
                Request::post("/api/v1/master/task/submit")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    /// §6/§7: malformed JSON must produce the `Malformed` variant's 400, not
    /// axum's default `JsonRejection` status.
    #[tokio::test]
    async fn malformed_submit_body_returns_400() {
        let router = router_with_secret("");
        let resp = router
            .oneshot(
                Request::post("/api/v1/master/task/submit")
                    .header("content-type", "application/json")
                    .body(Body::from("{not valid json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
