//! Plain, `Default`-able configuration the Coordinator is constructed with —
//! no parsing lives in the core (§9 "configuration hot-reload" is external).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub bind_addr: String,
    pub secret_key: String,
    pub max_workers: usize,
    pub task_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub queue_capacity: usize,
    pub task_request_wait: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            secret_key: String::new(),
            max_workers: 100,
            task_timeout: Duration::from_secs(5 * 60),
            heartbeat_interval: Duration::from_secs(10),
            queue_capacity: 10_000,
            task_request_wait: Duration::from_secs(5),
        }
    }
}
