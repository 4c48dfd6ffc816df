//! [`TaskIndex`]: the coordinator's authoritative `task_id -> Task` map, with
//! atomic per-task status transitions and filtered listing.

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::task::{Task, TaskStatus, VisitResult};

/// Per-task state record keyed by task id.
///
/// Transitions are serialized per task via `DashMap`'s per-shard locking: two
/// concurrent `mark_*` calls for the same id never interleave, matching the
/// spec's "task status transitions are serialized per task" requirement.
pub struct TaskIndex {
    tasks: DashMap<String, Task>,
    not_found_count: std::sync::atomic::AtomicU64,
}

impl Default for TaskIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            not_found_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Assigns an id (if absent) and stores the task as `Pending`.
    pub fn create(&self, task: Task) -> Task {
        let task = Task::submitted(task);
        self.insert_pending(task.clone());
        task
    }

    /// Stores an already-`Task::submitted` task as-is. Split out from
    /// [`TaskIndex::create`] so the coordinator's submit handler can try the
    /// queue first and only retain the task here on success — per §4.4/§4.8,
    /// a `QueueFull` submission must not be retained in the index at all.
    pub fn insert_pending(&self, task: Task) {
        debug!(task_id = %task.id, "task created");
        self.tasks.insert(task.id.clone(), task);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).map(|e| e.clone())
    }

    /// Transitions `Pending -> Assigned` and records the owning worker.
    /// No-op (counted) if the id is unknown.
    pub fn mark_assigned(&self, id: &str, worker_id: &str) {
        let Some(mut entry) = self.tasks.get_mut(id) else {
            self.count_not_found(id);
            return;
        };
        if entry.status.can_transition_to(TaskStatus::Assigned) {
            entry.status = TaskStatus::Assigned;
            entry.worker_id = Some(worker_id.to_string());
            entry.assigned_at = Some(chrono::Utc::now());
        } else {
            warn!(task_id = id, status = ?entry.status, "ignoring illegal transition to Assigned");
        }
    }

    /// Transitions `Assigned -> Running`. No-op (counted) if unknown.
    pub fn mark_running(&self, id: &str) {
        let Some(mut entry) = self.tasks.get_mut(id) else {
            self.count_not_found(id);
            return;
        };
        if entry.status.can_transition_to(TaskStatus::Running) {
            entry.status = TaskStatus::Running;
        } else {
            warn!(task_id = id, status = ?entry.status, "ignoring illegal transition to Running");
        }
    }

    /// Transitions to `Completed` with the given result. No-op (counted) if unknown.
    pub fn mark_completed(&self, id: &str, result: VisitResult) {
        self.mark_terminal(id, TaskStatus::Completed, result);
    }

    /// Transitions to `Failed` with a synthesized failure result. No-op (counted)
    /// if unknown — this is the spec's idempotent `NotFound` behavior: still a 200
    /// to the caller, just logged and counted internally.
    pub fn mark_failed(&self, id: &str, error: impl Into<String>) {
        let result = VisitResult::failure(error, std::time::Duration::ZERO);
        self.mark_terminal(id, TaskStatus::Failed, result);
    }

    fn mark_terminal(&self, id: &str, status: TaskStatus, result: VisitResult) {
        let Some(mut entry) = self.tasks.get_mut(id) else {
            self.count_not_found(id);
            return;
        };
        if entry.status.can_transition_to(status) {
            entry.status = status;
            entry.result = Some(result);
            entry.completed_at = Some(chrono::Utc::now());
        } else {
            warn!(task_id = id, status = ?entry.status, target = ?status, "ignoring illegal terminal transition");
        }
    }

    /// Re-queues a task held by a worker back to `Pending`, clearing `worker_id`.
    /// Only legal from `Assigned`/`Running`; used by worker-loss recovery policies
    /// (not invoked automatically by this core — see the coordinator's design notes).
    pub fn requeue(&self, id: &str) -> Option<Task> {
        let mut entry = self.tasks.get_mut(id)?;
        if entry.status.can_transition_to(TaskStatus::Pending) {
            entry.status = TaskStatus::Pending;
            entry.worker_id = None;
            entry.assigned_at = None;
            Some(entry.clone())
        } else {
            None
        }
    }

    #[must_use]
    pub fn list(&self, filter_status: Option<TaskStatus>) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|e| filter_status.is_none_or(|s| std::mem::discriminant(&e.status) == std::mem::discriminant(&s)))
            .map(|e| e.clone())
            .collect()
    }

    #[must_use]
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks
            .iter()
            .filter(|e| std::mem::discriminant(&e.status) == std::mem::discriminant(&status))
            .count()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn not_found_count(&self) -> u64 {
        self.not_found_count.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn count_not_found(&self, id: &str) {
        debug!(task_id = id, "task id not found; counted as NotFound");
        self.not_found_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
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
            created_at: chrono::Utc::now(),
            assigned_at: None,
            completed_at: None,
            result: None,
        }
    }

    #[test]
    fn create_assigns_id_and_pending() {
        let idx = TaskIndex::new();
        let t = idx.create(sample());
        assert!(!t.id.is_empty());
        assert_eq!(idx.get(&t.id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn full_lifecycle_happy_path() {
        let idx = TaskIndex::new();
        let t = idx.create(sample());
        idx.mark_assigned(&t.id, "w1");
        assert_eq!(idx.get(&t.id).unwrap().status, TaskStatus::Assigned);

        idx.mark_running(&t.id);
        assert_eq!(idx.get(&t.id).unwrap().status, TaskStatus::Running);

        idx.mark_completed(&t.id, VisitResult::success(200, std::time::Duration::from_millis(100)));
        let final_task = idx.get(&t.id).unwrap();
        assert_eq!(final_task.status, TaskStatus::Completed);
        assert!(final_task.result.unwrap().success);
    }

    #[test]
    fn unknown_id_operations_are_noop_and_counted() {
        let idx = TaskIndex::new();
        idx.mark_completed("ghost", VisitResult::success(200, std::time::Duration::ZERO));
        assert_eq!(idx.not_found_count(), 1);
        assert_eq!(idx.total(), 0);
    }

    #[test]
    fn list_filters_by_status() {
        let idx = TaskIndex::new();
        let a = idx.create(sample());
        let b = idx.create(sample());
        idx.mark_assigned(&a.id, "w1");

        let pending = idx.list(Some(TaskStatus::Pending));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }

    #[test]
    fn requeue_only_legal_from_assigned_or_running() {
        let idx = TaskIndex::new();
        let t = idx.create(sample());
        // Pending -> Pending requeue is illegal (not assigned yet).
        assert!(idx.requeue(&t.id).is_none());

        idx.mark_assigned(&t.id, "w1");
        let requeued = idx.requeue(&t.id).unwrap();
        assert_eq!(requeued.status, TaskStatus::Pending);
        assert!(requeued.worker_id.is_none());
    }
}
