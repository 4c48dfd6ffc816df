//! [`VisitProcessor`]: the pluggable "perform one visit" capability a
//! [`super::Worker`] drives its dispatch loops through.
//!
//! Kept as its own trait — distinct from [`crate::browser_driver::BrowserDriver`]
//! — so unit and integration tests can swap in a processor that returns canned
//! results without acquiring a real pooled browser, matching S1 in the testable
//! properties ("a worker whose processor returns `{success: true, ...}`").

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::browser_driver::BrowserDriver;
use crate::browser_pool::{BrowserPool, DriverFactory};
use crate::task::{Task, VisitResult};
use crate::visit_pipeline::{self, ReferrerPolicy, VisitProfile};

#[async_trait]
pub trait VisitProcessor: Send + Sync {
    async fn process(&self, task: &Task) -> VisitResult;
}

/// Production [`VisitProcessor`]: acquire a driver from the pool, run
/// [`crate::visit_pipeline::run`], release on drop (§4.6/§4.7 wired together).
pub struct PoolVisitProcessor<D: BrowserDriver, F: DriverFactory<D>> {
    pool: Arc<BrowserPool<D>>,
    factory: Arc<F>,
    referrer_policy: ReferrerPolicy,
}

impl<D: BrowserDriver + 'static, F: DriverFactory<D> + 'static> PoolVisitProcessor<D, F> {
    #[must_use]
    pub fn new(pool: Arc<BrowserPool<D>>, factory: Arc<F>, referrer_policy: ReferrerPolicy) -> Self {
        Self { pool, factory, referrer_policy }
    }
}

#[async_trait]
impl<D, F> VisitProcessor for PoolVisitProcessor<D, F>
where
    D: BrowserDriver + 'static,
    F: DriverFactory<D> + 'static,
{
    async fn process(&self, task: &Task) -> VisitResult {
        let start = Instant::now();
        let guard = match self.pool.acquire(self.factory.as_ref()).await {
            Ok(guard) => guard,
            Err(e) => return VisitResult::failure(format!("browser acquisition failed: {e}"), start.elapsed()),
        };

        let profile = VisitProfile {
            user_agent: None,
            device_metrics: None,
            timezone: None,
            tracking_id: None,
            reading_speed_chars_per_sec: 14.0,
        };

        visit_pipeline::run(
            guard.driver().as_ref(),
            &task.url,
            task.proxy.as_ref(),
            &self.referrer_policy,
            &profile,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use std::time::Duration;

    struct StubProcessor {
        result: VisitResult,
    }

    #[async_trait]
    impl VisitProcessor for StubProcessor {
        async fn process(&self, _task: &Task) -> VisitResult {
            self.result.clone()
        }
    }

    fn sample_task() -> Task {
        Task {
            id: "t1".into(),
            url: "http://example.com".into(),
            session_id: "s1".into(),
            proxy: None,
            behavior_profile_id: None,
            status: TaskStatus::Assigned,
            worker_id: Some("w1".into()),
            created_at: chrono::Utc::now(),
            assigned_at: Some(chrono::Utc::now()),
            completed_at: None,
            result: None,
        }
    }

    #[tokio::test]
    async fn stub_processor_returns_canned_result() {
        let stub = StubProcessor { result: VisitResult::success(200, Duration::from_millis(100)) };
        let result = stub.process(&sample_task()).await;
        assert!(result.success);
        assert_eq!(result.status_code, 200);
    }
}
