//! [`CoordinatorState`]: the `axum::State` shared across handlers.
//!
//! Handlers hold references to their collaborators through this struct rather
//! than through globals, per §9's explicit dependency-injection requirement.

use std::sync::Arc;

use crate::coordinator::config::CoordinatorConfig;
use crate::task_index::TaskIndex;
use crate::task_queue::TaskQueue;
use crate::worker_registry::WorkerRegistry;

#[derive(Clone)]
pub struct CoordinatorState {
    pub queue: Arc<TaskQueue>,
    pub index: Arc<TaskIndex>,
    pub registry: Arc<WorkerRegistry>,
    pub config: Arc<CoordinatorConfig>,
}

impl CoordinatorState {
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        let registry = Arc::new(WorkerRegistry::new(config.heartbeat_interval));
        let queue = Arc::new(TaskQueue::new(config.queue_capacity));
        Self {
            queue,
            index: Arc::new(TaskIndex::new()),
            registry,
            config: Arc::new(config),
        }
    }
}
