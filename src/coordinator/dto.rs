//! Wire DTOs for the Coordinator's HTTP surface (§6).

use serde::{Deserialize, Serialize};

use crate::task::VisitResult;
use crate::worker_info::HeartbeatCounters;

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: String,
    #[serde(flatten)]
    pub counters: HeartbeatCounters,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskRequestPayload {
    pub worker_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskCompletePayload {
    pub task_id: String,
    pub result: VisitResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskFailPayload {
    pub task_id: String,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisteredResponse {
    pub status: String,
    pub worker_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmittedResponse {
    pub status: String,
    pub task_id: String,
}

/// Read-only projection over `TaskIndex` + `WorkerRegistry`, computed on
/// demand and never stored (§3 ambient data model additions).
#[derive(Debug, Serialize)]
pub struct MasterStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub pending_tasks: usize,
    pub active_workers: usize,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
}
