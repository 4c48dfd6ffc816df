//! [`Worker`]: registers with a coordinator, drains tasks via `MaxConcurrency`
//! independent dispatch loops, and reports liveness via a heartbeat loop (§4.5).
//!
//! The worker is generic over a [`VisitProcessor`] rather than coupled
//! directly to [`crate::browser_pool::BrowserPool`]: production wires
//! [`PoolVisitProcessor`] (acquire from the pool, run the
//! [`crate::visit_pipeline`]), while tests substitute a processor that returns
//! canned [`VisitResult`]s without touching a real browser, the same
//! fake-over-mock shape [`crate::browser_driver::fake`] uses for the pool.

pub mod config;
pub mod processor;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use config::WorkerConfig;
pub use processor::{PoolVisitProcessor, VisitProcessor};

use crate::coordinator::dto::{
    HeartbeatRequest, RegisteredResponse, TaskCompletePayload, TaskFailPayload, TaskRequestPayload,
};
use crate::task::{Task, VisitResult};
use crate::worker_info::{HeartbeatCounters, WorkerInfo};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("coordinator rejected request: {0}")]
    Rejected(StatusCode),
    #[error("registration failed: {0}")]
    Registration(String),
}

/// Generates a worker id from a high-resolution timestamp plus random bits
/// (§4.5: "id generated locally, e.g., from a high-resolution timestamp and
/// random bits" — no coordination with the master is required or possible
/// before registration).
fn generate_worker_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let random: u64 = rand::random();
    format!("worker-{nanos:x}-{random:x}")
}

struct Counters {
    active_tasks: AtomicU64,
    total_tasks: AtomicU64,
    success_count: AtomicU64,
    failed_count: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            active_tasks: AtomicU64::new(0),
            total_tasks: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> HeartbeatCounters {
        HeartbeatCounters {
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            total_tasks: self.total_tasks.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failed_count: self.failed_count.load(Ordering::Relaxed),
        }
    }
}

/// A worker process: one `reqwest::Client` shared by every loop, a locally
/// generated id, and a pluggable [`VisitProcessor`] that actually performs
/// a task (§4.5).
pub struct Worker<P: VisitProcessor> {
    id: String,
    config: WorkerConfig,
    http: reqwest::Client,
    processor: Arc<P>,
    counters: Counters,
}

impl<P: VisitProcessor + 'static> Worker<P> {
    /// Builds a worker with a freshly generated id; does not contact the
    /// coordinator yet (see [`Worker::run`]).
    pub fn new(config: WorkerConfig, processor: Arc<P>) -> Result<Arc<Self>, WorkerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Arc::new(Self {
            id: generate_worker_id(),
            config,
            http,
            processor,
            counters: Counters::new(),
        }))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.master_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.secret_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.config.secret_key)
        }
    }

    /// Startup protocol step 1: POST `register` with this worker's
    /// [`WorkerInfo`].
    async fn register(&self) -> Result<(), WorkerError> {
        let info = WorkerInfo {
            id: self.id.clone(),
            hostname: self.config.hostname.clone(),
            version: self.config.version.clone(),
            max_concurrency: self.config.max_concurrency,
            active_tasks: 0,
            total_tasks: 0,
            success_count: 0,
            failed_count: 0,
            last_heartbeat: chrono::Utc::now(),
            status: crate::worker_info::WorkerStatus::Active,
        };
        let resp = self
            .authorize(self.http.post(self.endpoint("/api/v1/worker/register")))
            .json(&info)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(WorkerError::Registration(resp.status().to_string()));
        }
        let body: RegisteredResponse = resp.json().await?;
        info!(worker_id = %body.worker_id, "worker registered with coordinator");
        Ok(())
    }

    async fn heartbeat(&self) -> Result<(), WorkerError> {
        let req = HeartbeatRequest {
            worker_id: self.id.clone(),
            counters: self.counters.snapshot(),
        };
        let resp = self
            .authorize(self.http.post(self.endpoint("/api/v1/worker/heartbeat")))
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(WorkerError::Rejected(resp.status()));
        }
        Ok(())
    }

    /// §4.5 dispatch loop step: "call `task_request`". Returns `None` on the
    /// coordinator's 204 ("no task available"), distinct from a transport error.
    async fn request_task(&self) -> Result<Option<Task>, WorkerError> {
        let resp = self
            .authorize(self.http.post(self.endpoint("/api/v1/worker/task/request")))
            .json(&TaskRequestPayload { worker_id: self.id.clone() })
            .send()
            .await?;
        match resp.status() {
            StatusCode::NO_CONTENT => Ok(None),
            s if s.is_success() => Ok(Some(resp.json().await?)),
            s => Err(WorkerError::Rejected(s)),
        }
    }

    async fn report_complete(&self, task_id: &str, result: VisitResult) -> Result<(), WorkerError> {
        let resp = self
            .authorize(self.http.post(self.endpoint("/api/v1/worker/task/complete")))
            .json(&TaskCompletePayload { task_id: task_id.to_string(), result })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(WorkerError::Rejected(resp.status()));
        }
        Ok(())
    }

    async fn report_fail(&self, task_id: &str, error: String) -> Result<(), WorkerError> {
        let resp = self
            .authorize(self.http.post(self.endpoint("/api/v1/worker/task/fail")))
            .json(&TaskFailPayload { task_id: task_id.to_string(), error })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(WorkerError::Rejected(resp.status()));
        }
        Ok(())
    }

    /// Runs registration, then `MaxConcurrency` dispatch loops plus one
    /// heartbeat loop, until `cancel` fires. Transport errors from heartbeats
    /// are logged and ignored per §4.5; registration failure is fatal since
    /// the worker cannot be assigned tasks otherwise.
    pub async fn run(self: &Arc<Self>, cancel: CancellationToken) -> Result<(), WorkerError> {
        self.register().await?;

        let mut handles = Vec::new();
        for slot in 0..self.config.max_concurrency {
            let worker = Arc::clone(self);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                worker.dispatch_loop(slot, cancel).await;
            }));
        }

        let worker = Arc::clone(self);
        let hb_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            worker.heartbeat_loop(hb_cancel).await;
        }));

        cancel.cancelled().await;
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    async fn dispatch_loop(self: Arc<Self>, slot: u32, cancel: CancellationToken) {
        debug!(slot, worker_id = %self.id, "dispatch loop started");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let task = tokio::select! {
                () = cancel.cancelled() => break,
                outcome = self.request_task() => outcome,
            };

            match task {
                Ok(Some(task)) => self.process_and_report(task, &cancel).await,
                Ok(None) => tokio::time::sleep(Duration::from_secs(2)).await,
                Err(e) => {
                    warn!(slot, error = %e, "task request failed, backing off");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
        debug!(slot, worker_id = %self.id, "dispatch loop stopped");
    }

    async fn process_and_report(&self, task: Task, cancel: &CancellationToken) {
        self.counters.active_tasks.fetch_add(1, Ordering::Relaxed);
        let deadline = self.config.effective_visit_deadline();

        let result = tokio::select! {
            () = cancel.cancelled() => VisitResult::failure("cancelled", Duration::ZERO),
            outcome = tokio::time::timeout(deadline, self.processor.process(&task)) => {
                outcome.unwrap_or_else(|_| VisitResult::failure("visit timed out", deadline))
            }
        };

        self.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
        self.counters.total_tasks.fetch_add(1, Ordering::Relaxed);

        // §6 exposes two distinct report endpoints; which one a task's outcome
        // goes to is decided by `VisitResult::success`, not by which API call
        // the processor happened to make.
        let report = if result.success {
            self.counters.success_count.fetch_add(1, Ordering::Relaxed);
            self.report_complete(&task.id, result).await
        } else {
            self.counters.failed_count.fetch_add(1, Ordering::Relaxed);
            let error = result.error.clone();
            self.report_fail(&task.id, error).await
        };

        if let Err(e) = report {
            warn!(task_id = %task.id, error = ?e, "failed to report task outcome; transport failures are logged and not retried");
        }
    }

    /// Heartbeat loop: every `HeartbeatInterval`, POST counters. Transport
    /// errors are logged and ignored (§4.5) — the loop keeps running so a
    /// transient coordinator outage does not stop future heartbeats.
    async fn heartbeat_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.heartbeat().await {
                        warn!(worker_id = %self.id, error = %e, "heartbeat failed, continuing");
                    }
                }
            }
        }
    }
}
