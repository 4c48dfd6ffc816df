//! [`WorkerInfo`]: the coordinator's view of a registered worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    Active,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: String,
    pub hostname: String,
    pub version: String,
    pub max_concurrency: u32,
    #[serde(default)]
    pub active_tasks: u64,
    #[serde(default)]
    pub total_tasks: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failed_count: u64,
    #[serde(default = "Utc::now")]
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default = "WorkerInfo::default_status")]
    pub status: WorkerStatus,
}

impl WorkerInfo {
    fn default_status() -> WorkerStatus {
        WorkerStatus::Active
    }

    /// `Active ∧ now − last_heartbeat < 2·heartbeat_interval`.
    #[must_use]
    pub fn is_healthy(&self, heartbeat_interval: Duration) -> bool {
        if !matches!(self.status, WorkerStatus::Active) {
            return false;
        }
        let elapsed = Utc::now().signed_duration_since(self.last_heartbeat);
        match elapsed.to_std() {
            Ok(elapsed) => elapsed < heartbeat_interval.saturating_mul(2),
            Err(_) => true, // elapsed is negative (clock skew); treat as fresh
        }
    }
}

/// Counters reported in a heartbeat payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeartbeatCounters {
    pub active_tasks: u64,
    pub total_tasks: u64,
    pub success_count: u64,
    pub failed_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkerInfo {
        WorkerInfo {
            id: "w1".into(),
            hostname: "host-1".into(),
            version: "0.1.0".into(),
            max_concurrency: 4,
            active_tasks: 0,
            total_tasks: 0,
            success_count: 0,
            failed_count: 0,
            last_heartbeat: Utc::now(),
            status: WorkerStatus::Active,
        }
    }

    #[test]
    fn fresh_heartbeat_is_healthy() {
        let w = sample();
        assert!(w.is_healthy(Duration::from_secs(10)));
    }

    #[test]
    fn stale_heartbeat_is_unhealthy() {
        let mut w = sample();
        w.last_heartbeat = Utc::now() - chrono::Duration::seconds(30);
        assert!(!w.is_healthy(Duration::from_secs(10)));
    }

    #[test]
    fn offline_status_is_unhealthy_regardless_of_heartbeat() {
        let mut w = sample();
        w.status = WorkerStatus::Offline;
        assert!(!w.is_healthy(Duration::from_secs(10)));
    }
}
