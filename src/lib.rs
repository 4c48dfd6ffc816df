pub mod browser_driver;
pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod coordinator;
pub mod task;
pub mod task_index;
pub mod task_queue;
pub mod utils;
pub mod visit_pipeline;
pub mod worker;
pub mod worker_info;
pub mod worker_registry;

pub use browser_driver::{BrowserDriver, DriverError};
pub use browser_pool::{BrowserPool, BrowserPoolConfig, DriverFactory, PooledBrowserGuard};
pub use coordinator::{CoordinatorConfig, CoordinatorState};
pub use task::{ProxyDescriptor, ProxyProtocol, Task, TaskStatus, VisitResult};
pub use task_index::TaskIndex;
pub use task_queue::TaskQueue;
pub use visit_pipeline::{ReferrerPolicy, VisitProfile};
pub use worker::{VisitProcessor, Worker, WorkerConfig};
pub use worker_info::{HeartbeatCounters, WorkerInfo, WorkerStatus};
pub use worker_registry::WorkerRegistry;
