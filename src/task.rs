//! Core data model: [`Task`], [`TaskStatus`], [`VisitResult`] and the proxy/behavior
//! descriptors that travel with a task from submission through completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Proxy protocol a [`Task`] may be routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Socks5,
}

/// Resolved proxy descriptor. The core never acquires, checks, or rotates
/// proxies itself — it only carries whatever descriptor the submitter supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub protocol: ProxyProtocol,
}

/// Lifecycle state of a [`Task`].
///
/// Transitions only along `Pending -> Assigned -> Running -> (Completed | Failed)`.
/// `Assigned -> Pending` is permitted only via recovery on worker loss, which this
/// core does not perform automatically (see the coordinator's staleness sweep).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether `self -> next` is a legal transition per the invariant above.
    #[must_use]
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::{Assigned, Completed, Failed, Pending, Running};
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Assigned, Running)
                | (Assigned, Pending) // worker-loss recovery only
                | (Running, Completed)
                | (Running, Failed)
                // Direct Assigned -> Completed/Failed covers workers that report
                // a result without an intermediate Running transition.
                | (Assigned, Completed)
                | (Assigned, Failed)
        )
    }
}

/// Outcome of a single visit, produced by the [`crate::visit_pipeline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitResult {
    pub success: bool,
    /// HTTP status code; 0 if no response was ever received.
    pub status_code: u16,
    pub response_time: Duration,
    /// Empty iff `success`.
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl VisitResult {
    #[must_use]
    pub fn success(status_code: u16, response_time: Duration) -> Self {
        Self {
            success: (200..400).contains(&status_code),
            status_code,
            response_time,
            error: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn failure(error: impl Into<String>, response_time: Duration) -> Self {
        Self {
            success: false,
            status_code: 0,
            response_time,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One unit of work: a single URL to visit under given options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub url: String,
    pub session_id: String,
    #[serde(default)]
    pub proxy: Option<ProxyDescriptor>,
    #[serde(default)]
    pub behavior_profile_id: Option<String>,
    #[serde(default = "TaskStatus::default_pending")]
    pub status: TaskStatus,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<VisitResult>,
}

impl TaskStatus {
    fn default_pending() -> Self {
        TaskStatus::Pending
    }
}

impl Task {
    /// Construct a task from submitted fields, assigning a fresh id and `Pending`
    /// status regardless of whatever the submitter sent in those fields.
    #[must_use]
    pub fn submitted(mut task: Task) -> Self {
        task.id = uuid::Uuid::new_v4().to_string();
        task.status = TaskStatus::Pending;
        task.worker_id = None;
        task.created_at = Utc::now();
        task.assigned_at = None;
        task.completed_at = None;
        task.result = None;
        task
    }

    /// `worker_id` must be non-empty iff `status` is `Assigned` or `Running`.
    #[must_use]
    pub fn worker_id_invariant_holds(&self) -> bool {
        let has_worker = self
            .worker_id
            .as_ref()
            .is_some_and(|id| !id.is_empty());
        has_worker == matches!(self.status, TaskStatus::Assigned | TaskStatus::Running)
    }

    /// `result` must be present iff `status` is `Completed` or `Failed`.
    #[must_use]
    pub fn result_invariant_holds(&self) -> bool {
        self.result.is_some() == matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        Task {
            id: String::new(),
            url: "http://example.com".into(),
            session_id: "s1".into(),
            proxy: None,
            behavior_profile_id: None,
            status: TaskStatus::Pending,
            worker_id: None,
            created_at: Utc::now(),
            assigned_at: None,
            completed_at: None,
            result: None,
        }
    }

    #[test]
    fn submitted_assigns_fresh_id_and_pending_status() {
        let t = Task::submitted(sample());
        assert!(!t.id.is_empty());
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.worker_id_invariant_holds());
        assert!(t.result_invariant_holds());
    }

    #[test]
    fn legal_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Assigned));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Assigned.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn illegal_transitions_rejected() {
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Running));
    }

    #[test]
    fn worker_id_invariant() {
        let mut t = sample();
        t.status = TaskStatus::Assigned;
        t.worker_id = Some("w1".into());
        assert!(t.worker_id_invariant_holds());

        t.worker_id = None;
        assert!(!t.worker_id_invariant_holds());
    }
}
