//! [`WorkerRegistry`]: tracks worker liveness and capacity, with a periodic
//! staleness sweep flipping lapsed workers to `Offline`.

use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::worker_info::{HeartbeatCounters, WorkerInfo, WorkerStatus};

/// Many-readers/one-writer map of `worker_id -> WorkerInfo`.
///
/// `DashMap` gives per-entry locking rather than a single coarse `RwLock`,
/// matching the spec's "multiple readers, exclusive writers" concurrency note
/// at the granularity of one worker at a time rather than the whole registry.
pub struct WorkerRegistry {
    workers: DashMap<String, WorkerInfo>,
    heartbeat_interval: Duration,
}

impl WorkerRegistry {
    #[must_use]
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            workers: DashMap::new(),
            heartbeat_interval,
        }
    }

    /// Upserts the worker, setting `last_heartbeat=now` and `status=Active`.
    pub fn register(&self, mut info: WorkerInfo) {
        info.last_heartbeat = chrono::Utc::now();
        info.status = WorkerStatus::Active;
        info!(worker_id = %info.id, "worker registered");
        self.workers.insert(info.id.clone(), info);
    }

    /// Updates counters and `last_heartbeat`. Silently ignored for unknown ids.
    pub fn heartbeat(&self, worker_id: &str, counters: HeartbeatCounters) -> bool {
        let Some(mut entry) = self.workers.get_mut(worker_id) else {
            debug!(worker_id, "heartbeat from unknown worker ignored");
            return false;
        };
        entry.last_heartbeat = chrono::Utc::now();
        entry.active_tasks = counters.active_tasks;
        entry.total_tasks = counters.total_tasks;
        entry.success_count = counters.success_count;
        entry.failed_count = counters.failed_count;
        // A worker sending a heartbeat is, by definition, reachable again.
        entry.status = WorkerStatus::Active;
        true
    }

    #[must_use]
    pub fn get(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.workers.get(worker_id).map(|e| e.clone())
    }

    /// Snapshot of every worker satisfying the health predicate.
    #[must_use]
    pub fn list_healthy(&self) -> Vec<WorkerInfo> {
        self.workers
            .iter()
            .filter(|e| e.is_healthy(self.heartbeat_interval))
            .map(|e| e.clone())
            .collect()
    }

    /// Snapshot of every registered worker, healthy or not.
    #[must_use]
    pub fn list_all(&self) -> Vec<WorkerInfo> {
        self.workers.iter().map(|e| e.clone()).collect()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.list_healthy().len()
    }

    /// Marks every worker whose heartbeat has lapsed beyond `2 * heartbeat_interval`
    /// as `Offline`. Returns the ids that flipped this sweep.
    pub fn sweep(&self) -> Vec<String> {
        let threshold = self.heartbeat_interval.saturating_mul(2);
        let now = chrono::Utc::now();
        let mut flipped = Vec::new();

        for mut entry in self.workers.iter_mut() {
            if matches!(entry.status, WorkerStatus::Offline) {
                continue;
            }
            let elapsed = now.signed_duration_since(entry.last_heartbeat);
            let lapsed = elapsed
                .to_std()
                .map(|d| d > threshold)
                .unwrap_or(false);
            if lapsed {
                entry.status = WorkerStatus::Offline;
                flipped.push(entry.id.clone());
            }
        }

        if !flipped.is_empty() {
            info!(count = flipped.len(), "workers marked offline by staleness sweep");
        }
        flipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> WorkerInfo {
        WorkerInfo {
            id: id.into(),
            hostname: "host".into(),
            version: "0.1.0".into(),
            max_concurrency: 1,
            active_tasks: 0,
            total_tasks: 0,
            success_count: 0,
            failed_count: 0,
            last_heartbeat: chrono::Utc::now(),
            status: WorkerStatus::Active,
        }
    }

    #[test]
    fn register_then_list_healthy() {
        let reg = WorkerRegistry::new(Duration::from_secs(10));
        reg.register(sample("w1"));
        assert_eq!(reg.list_healthy().len(), 1);
    }

    #[test]
    fn heartbeat_unknown_worker_is_noop() {
        let reg = WorkerRegistry::new(Duration::from_secs(10));
        let ok = reg.heartbeat(
            "ghost",
            HeartbeatCounters {
                active_tasks: 0,
                total_tasks: 0,
                success_count: 0,
                failed_count: 0,
            },
        );
        assert!(!ok);
        assert!(reg.list_all().is_empty());
    }

    #[test]
    fn sweep_marks_stale_workers_offline() {
        let reg = WorkerRegistry::new(Duration::from_millis(10));
        let mut w = sample("w1");
        w.last_heartbeat = chrono::Utc::now() - chrono::Duration::milliseconds(100);
        reg.register(w);
        // register() stamps last_heartbeat=now, so backdate again post-register.
        reg.workers.get_mut("w1").unwrap().last_heartbeat =
            chrono::Utc::now() - chrono::Duration::milliseconds(100);

        let flipped = reg.sweep();
        assert_eq!(flipped, vec!["w1".to_string()]);
        assert_eq!(reg.list_healthy().len(), 0);
    }

    #[test]
    fn counter_monotonicity_under_repeated_heartbeats() {
        let reg = WorkerRegistry::new(Duration::from_secs(10));
        reg.register(sample("w1"));
        for n in 1..=3 {
            reg.heartbeat(
                "w1",
                HeartbeatCounters {
                    active_tasks: 0,
                    total_tasks: n,
                    success_count: n,
                    failed_count: 0,
                },
            );
        }
        assert_eq!(reg.get("w1").unwrap().total_tasks, 3);
    }
}
