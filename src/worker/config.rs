//! Plain, `Default`-able configuration the [`super::Worker`] is constructed
//! with (§6): `MasterURL`, `SecretKey`, `MaxConcurrency`, `Hostname`,
//! `Version`, plus the per-task/heartbeat timings §4.5 and §5 name.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub master_url: String,
    pub secret_key: String,
    pub max_concurrency: u32,
    pub hostname: String,
    pub version: String,
    /// §4.5: "Every `HeartbeatInterval` (default 10 s)".
    pub heartbeat_interval: Duration,
    /// §4.5: "bound the visit in a timeout (default 5 min)" — the
    /// worker-imposed cap on one dispatch-loop iteration.
    pub task_timeout: Duration,
    /// §5: "VisitPipeline: overall bound <= VisitTimeout (90s default)".
    pub visit_timeout: Duration,
    /// §6: HTTP client request timeout (30s default).
    pub request_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            master_url: "http://127.0.0.1:8080".to_string(),
            secret_key: String::new(),
            max_concurrency: 4,
            hostname: "localhost".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            heartbeat_interval: Duration::from_secs(10),
            task_timeout: Duration::from_secs(5 * 60),
            visit_timeout: Duration::from_secs(90),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// The effective per-visit deadline: the tighter of `visit_timeout` and
    /// `task_timeout`, per §5's "whichever is tighter".
    #[must_use]
    pub fn effective_visit_deadline(&self) -> Duration {
        self.visit_timeout.min(self.task_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_deadline_is_the_tighter_bound() {
        let mut cfg = WorkerConfig {
            visit_timeout: Duration::from_secs(120),
            task_timeout: Duration::from_secs(60),
            ..WorkerConfig::default()
        };
        assert_eq!(cfg.effective_visit_deadline(), Duration::from_secs(60));
        cfg.visit_timeout = Duration::from_secs(30);
        assert_eq!(cfg.effective_visit_deadline(), Duration::from_secs(30));
    }
}
