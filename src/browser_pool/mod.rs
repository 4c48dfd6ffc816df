//! Bounded pool of [`BrowserDriver`] instances with age/session recycling.
//!
//! Generalizes the crawler's original `chromiumoxide`-concrete pool (dynamic
//! scaling to `max(in_use + 2, min_pool_size)`, idle-timeout sweep) to the
//! spec's fixed min/max bounds, explicit recycle predicate, and two-phase
//! locked maintenance loop: victims are collected under the registry lock and
//! destroyed/replaced after releasing it, so a slow driver create/destroy call
//! never holds the registry lock the acquire path also needs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser_driver::{BrowserDriver, DriverError};

#[derive(Debug, Clone, Copy)]
pub struct BrowserPoolConfig {
    pub min_instances: usize,
    pub max_instances: usize,
    pub acquire_timeout: Duration,
    pub instance_max_age: Duration,
    pub instance_max_sessions: u64,
    pub headless: bool,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            min_instances: 2,
            max_instances: 10,
            acquire_timeout: Duration::from_secs(30),
            instance_max_age: Duration::from_secs(30 * 60),
            instance_max_sessions: 200,
            headless: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("acquire timed out after {0:?}")]
    AcquireTimeout(Duration),
    #[error("failed to create browser instance: {0}")]
    Create(#[from] DriverError),
    #[error("pool is shutting down")]
    ShuttingDown,
}

/// Counters and gauges the spec names for `PoolMetrics`.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub created: AtomicU64,
    pub destroyed: AtomicU64,
    pub reused: AtomicU64,
    pub acquired: AtomicU64,
    pub released: AtomicU64,
    pub acquire_waits: AtomicU64,
    pub reset_errors: AtomicU64,
    pub active: AtomicUsize,
    pub idle: AtomicUsize,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolMetricsSnapshot {
    pub created: u64,
    pub destroyed: u64,
    pub reused: u64,
    pub acquired: u64,
    pub released: u64,
    pub acquire_waits: u64,
    pub reset_errors: u64,
    pub active: usize,
    pub idle: usize,
}

impl PoolMetrics {
    fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            acquire_waits: self.acquire_waits.load(Ordering::Relaxed),
            reset_errors: self.reset_errors.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
        }
    }
}

/// One pooled driver plus the bookkeeping the recycle predicate needs.
struct Instance<D> {
    id: u64,
    driver: Arc<D>,
    created_at: Instant,
    last_used_at: Instant,
    session_count: u64,
}

impl<D> Instance<D> {
    fn should_recycle(&self, cfg: &BrowserPoolConfig) -> bool {
        self.created_at.elapsed() > cfg.instance_max_age || self.session_count >= cfg.instance_max_sessions
    }
}

/// Bounded pool of `D: BrowserDriver` instances.
///
/// `idle` holds instances not currently checked out. `total` is the number of
/// instances that exist anywhere (idle + checked out) and is what `Acquire`
/// step 2 compares against `max_instances` — it is tracked separately from
/// `idle.len()` so the count stays correct while an instance is checked out.
pub struct BrowserPool<D: BrowserDriver> {
    config: BrowserPoolConfig,
    idle: Mutex<VecDeque<Instance<D>>>,
    total: AtomicUsize,
    next_id: AtomicU64,
    shutting_down: std::sync::atomic::AtomicBool,
    maintenance_handle: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<PoolMetrics>,
}

/// Factory abstraction so the pool can create driver instances without
/// depending on `ChromiumoxideDriver::launch` directly — the fake driver tests
/// use a no-op factory, production wires the real launcher.
#[async_trait::async_trait]
pub trait DriverFactory<D>: Send + Sync {
    async fn create(&self) -> Result<D, DriverError>;
}

impl<D: BrowserDriver + 'static> BrowserPool<D> {
    #[must_use]
    pub fn new(config: BrowserPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            idle: Mutex::new(VecDeque::new()),
            total: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            shutting_down: std::sync::atomic::AtomicBool::new(false),
            maintenance_handle: Mutex::new(None),
            metrics: Arc::new(PoolMetrics::default()),
        })
    }

    #[must_use]
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Pre-warms to `min_instances` and starts the ~1-minute recycling loop.
    pub async fn start<F>(self: &Arc<Self>, factory: Arc<F>) -> Result<(), PoolError>
    where
        F: DriverFactory<D> + 'static,
    {
        for _ in 0..self.config.min_instances {
            let inst = self.create_instance(factory.as_ref()).await?;
            self.idle.lock().await.push_back(inst);
        }
        self.metrics.idle.store(self.idle.lock().await.len(), Ordering::Relaxed);

        let pool = Arc::clone(self);
        let factory_for_loop = Arc::clone(&factory);
        let handle = tokio::spawn(async move {
            maintenance_loop(pool, factory_for_loop).await;
        });
        *self.maintenance_handle.lock().await = Some(handle);
        Ok(())
    }

    async fn create_instance<F>(&self, factory: &F) -> Result<Instance<D>, PoolError>
    where
        F: DriverFactory<D>,
    {
        let driver = factory.create().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.metrics.created.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        Ok(Instance {
            id,
            driver: Arc::new(driver),
            created_at: now,
            last_used_at: now,
            session_count: 0,
        })
    }

    async fn destroy_instance(&self, inst: Instance<D>) {
        if let Err(e) = inst.driver.terminate().await {
            warn!(instance_id = inst.id, error = %e, "driver terminate failed during destroy");
        }
        self.total.fetch_sub(1, Ordering::Relaxed);
        self.metrics.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    /// Acquire(ctx): steps 1-5 of §4.6.
    pub async fn acquire<F>(self: &Arc<Self>, factory: &F) -> Result<PooledBrowserGuard<D>, PoolError>
    where
        F: DriverFactory<D>,
    {
        if self.shutting_down.load(Ordering::Relaxed) {
            return Err(PoolError::ShuttingDown);
        }

        let deadline = Instant::now() + self.config.acquire_timeout;
        let mut waited = false;

        loop {
            // Step 1: try an idle instance non-blockingly.
            let candidate = self.idle.lock().await.pop_front();
            if let Some(mut inst) = candidate {
                self.metrics.idle.fetch_sub(1, Ordering::Relaxed);

                // Step 4: recycle check before handing out.
                if inst.should_recycle(&self.config) {
                    self.destroy_instance(inst).await;
                    match self.create_instance(factory).await {
                        Ok(fresh) => inst = fresh,
                        Err(e) => {
                            warn!(error = %e, "failed to create replacement during acquire-time recycle");
                            continue;
                        }
                    }
                }

                inst.last_used_at = Instant::now();
                inst.session_count += 1;
                self.metrics.acquired.fetch_add(1, Ordering::Relaxed);
                self.metrics.reused.fetch_add(1, Ordering::Relaxed);
                self.metrics.active.fetch_add(1, Ordering::Relaxed);

                return Ok(PooledBrowserGuard {
                    pool: Arc::clone(self),
                    inst: Some(inst),
                });
            }

            // Step 2: under capacity, create synchronously.
            if self.total.load(Ordering::Relaxed) < self.config.max_instances {
                let mut inst = self.create_instance(factory).await?;
                inst.session_count += 1;
                self.metrics.acquired.fetch_add(1, Ordering::Relaxed);
                self.metrics.active.fetch_add(1, Ordering::Relaxed);
                return Ok(PooledBrowserGuard {
                    pool: Arc::clone(self),
                    inst: Some(inst),
                });
            }

            // Step 3: at capacity, block up to AcquireTimeout.
            if Instant::now() >= deadline {
                return Err(PoolError::AcquireTimeout(self.config.acquire_timeout));
            }
            if !waited {
                self.metrics.acquire_waits.fetch_add(1, Ordering::Relaxed);
                waited = true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Release(inst): steps 1-4 of §4.6, run from the guard's `Drop`.
    fn release(self: &Arc<Self>, inst: Instance<D>) {
        self.metrics.active.fetch_sub(1, Ordering::Relaxed);
        self.metrics.released.fetch_add(1, Ordering::Relaxed);

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            if pool.shutting_down.load(Ordering::Relaxed) {
                pool.destroy_instance(inst).await;
                return;
            }

            if let Err(e) = reset_instance(&inst).await {
                warn!(instance_id = inst.id, error = %e, "reset failed, destroying instance");
                pool.metrics.reset_errors.fetch_add(1, Ordering::Relaxed);
                pool.destroy_instance(inst).await;
                return;
            }

            let mut idle = pool.idle.lock().await;
            if idle.len() < pool.config.max_instances {
                idle.push_back(inst);
                pool.metrics.idle.fetch_add(1, Ordering::Relaxed);
            } else {
                drop(idle);
                pool.destroy_instance(inst).await;
            }
        });
    }

    /// Drains and destroys everything, idle or not, and stops the maintenance loop.
    /// Per §4.6, the idle set is drained by polling rather than by closing a
    /// channel, since outstanding `Release` calls may still be pushing into it.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);

        if let Some(handle) = self.maintenance_handle.lock().await.take() {
            handle.abort();
        }

        loop {
            let next = self.idle.lock().await.pop_front();
            match next {
                Some(inst) => self.destroy_instance(inst).await,
                None => break,
            }
        }
        info!("browser pool shutdown complete");
    }
}

/// Reset: clear cookies/cache in parallel, then establish a fresh tab.
async fn reset_instance<D: BrowserDriver>(inst: &Instance<D>) -> Result<(), DriverError> {
    let timeout = Duration::from_secs(10);
    let driver = Arc::clone(&inst.driver);

    let clear = async {
        let d1 = Arc::clone(&driver);
        let d2 = Arc::clone(&driver);
        let (cookies, cache) = tokio::join!(async move { d1.clear_cookies().await }, async move {
            d2.clear_cache().await
        });
        cookies.and(cache)
    };
    tokio::time::timeout(timeout, clear)
        .await
        .map_err(|_| DriverError::Timeout(timeout))??;

    tokio::time::timeout(timeout, driver.discard_tab())
        .await
        .map_err(|_| DriverError::Timeout(timeout))??;
    tokio::time::timeout(timeout, driver.open_tab())
        .await
        .map_err(|_| DriverError::Timeout(timeout))??;
    Ok(())
}

/// ForceReset: fresh tab plus a scripted wipe of storage/IndexedDB/caches,
/// for callers that detect contamination Reset alone would not clear.
pub async fn force_reset<D: BrowserDriver>(driver: &D) -> Result<(), DriverError> {
    driver.discard_tab().await?;
    driver.open_tab().await?;
    driver
        .evaluate_script(
            "try { localStorage.clear(); } catch (e) {}\n\
             try { sessionStorage.clear(); } catch (e) {}\n\
             try { indexedDB.databases().then(dbs => dbs.forEach(db => indexedDB.deleteDatabase(db.name))); } catch (e) {}",
        )
        .await?;
    driver.clear_cache().await?;
    driver.clear_cookies().await?;
    Ok(())
}

/// RAII guard returned by [`BrowserPool::acquire`]; releases back to the pool
/// (running Reset) on drop, mirroring the teacher's `PooledBrowserGuard`.
pub struct PooledBrowserGuard<D: BrowserDriver> {
    pool: Arc<BrowserPool<D>>,
    inst: Option<Instance<D>>,
}

impl<D: BrowserDriver> PooledBrowserGuard<D> {
    #[must_use]
    pub fn driver(&self) -> &Arc<D> {
        &self.inst.as_ref().expect("instance present until drop").driver
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inst.as_ref().expect("instance present until drop").id
    }

    #[must_use]
    pub fn session_count(&self) -> u64 {
        self.inst.as_ref().expect("instance present until drop").session_count
    }
}

impl<D: BrowserDriver> Drop for PooledBrowserGuard<D> {
    fn drop(&mut self) {
        if let Some(inst) = self.inst.take() {
            self.pool.release(inst);
        }
    }
}

/// Every ~1 minute: collect idle instances matching the recycle predicate
/// while honoring `min_instances`, release the lock, destroy the victims, then
/// create replacements outside the lock (the two-phase discipline §5 calls for
/// to avoid a lock held across a driver launch).
async fn maintenance_loop<D, F>(pool: Arc<BrowserPool<D>>, factory: Arc<F>)
where
    D: BrowserDriver + 'static,
    F: DriverFactory<D> + 'static,
{
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if pool.shutting_down.load(Ordering::Relaxed) {
            break;
        }

        let victims = {
            let mut idle = pool.idle.lock().await;
            // Each victim is replaced 1:1 below, so the idle count itself never
            // dips below min_instances; what we actually bound here is how many
            // recycle candidates we take in one pass, so a pool sitting exactly
            // at min_instances doesn't have every instance destroyed at once.
            let max_victims = idle.len().saturating_sub(pool.config.min_instances.min(idle.len()).saturating_sub(1)).max(1);
            let mut victims = Vec::new();
            let mut kept = VecDeque::with_capacity(idle.len());

            while let Some(inst) = idle.pop_front() {
                if victims.len() < max_victims && inst.should_recycle(&pool.config) {
                    victims.push(inst);
                } else {
                    kept.push_back(inst);
                }
            }
            *idle = kept;
            pool.metrics.idle.store(idle.len(), Ordering::Relaxed);
            victims
        };

        if victims.is_empty() {
            continue;
        }
        debug!(count = victims.len(), "recycling idle browser instances");

        for victim in victims {
            pool.destroy_instance(victim).await;
            match pool.create_instance(factory.as_ref()).await {
                Ok(fresh) => {
                    pool.idle.lock().await.push_back(fresh);
                    pool.metrics.idle.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!(error = %e, "failed to create replacement during recycling"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser_driver::fake::FakeDriver;

    struct FakeFactory;

    #[async_trait::async_trait]
    impl DriverFactory<FakeDriver> for FakeFactory {
        async fn create(&self) -> Result<FakeDriver, DriverError> {
            Ok(FakeDriver::new())
        }
    }

    fn test_config(min: usize, max: usize) -> BrowserPoolConfig {
        BrowserPoolConfig {
            min_instances: min,
            max_instances: max,
            acquire_timeout: Duration::from_millis(200),
            instance_max_age: Duration::from_secs(3600),
            instance_max_sessions: 1000,
            headless: true,
        }
    }

    #[tokio::test]
    async fn acquire_then_release_returns_to_idle() {
        let pool = BrowserPool::<FakeDriver>::new(test_config(0, 2));
        let factory = FakeFactory;
        let guard = pool.acquire(&factory).await.unwrap();
        assert_eq!(guard.session_count(), 1);
        drop(guard);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let metrics = pool.metrics();
        assert_eq!(metrics.released, 1);
    }

    #[tokio::test]
    async fn acquire_beyond_max_times_out() {
        let pool = BrowserPool::<FakeDriver>::new(test_config(0, 1));
        let factory = FakeFactory;
        let _held = pool.acquire(&factory).await.unwrap();

        let err = pool.acquire(&factory).await.unwrap_err();
        assert!(matches!(err, PoolError::AcquireTimeout(_)));
    }

    #[tokio::test]
    async fn release_after_capacity_wait_unblocks_acquire() {
        let pool = BrowserPool::<FakeDriver>::new(BrowserPoolConfig {
            acquire_timeout: Duration::from_secs(2),
            ..test_config(0, 1)
        });
        let factory = FakeFactory;
        let held = pool.acquire(&factory).await.unwrap();

        let pool2 = Arc::clone(&pool);
        let waiter = tokio::spawn(async move {
            let factory = FakeFactory;
            pool2.acquire(&factory).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        let result = waiter.await.unwrap();
        assert!(result.is_ok());
    }

    /// S5 — recycle by sessions: with `instance_max_sessions=3`, the 4th
    /// acquire-release cycle observes the recycle predicate and replaces the
    /// instance rather than reusing it.
    #[tokio::test]
    async fn recycles_instance_once_max_sessions_reached() {
        let pool = BrowserPool::<FakeDriver>::new(BrowserPoolConfig {
            instance_max_sessions: 3,
            ..test_config(0, 1)
        });
        let factory = FakeFactory;

        for _ in 0..4 {
            let guard = pool.acquire(&factory).await.unwrap();
            drop(guard);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let metrics = pool.metrics();
        assert!(metrics.destroyed >= 1, "expected at least one recycle destroy, got {metrics:?}");
        assert!(metrics.created >= 2, "expected the pool to have created a replacement, got {metrics:?}");
    }

    #[tokio::test]
    async fn shutdown_destroys_idle_instances() {
        let pool = BrowserPool::<FakeDriver>::new(test_config(0, 2));
        let factory = FakeFactory;
        let guard = pool.acquire(&factory).await.unwrap();
        drop(guard);
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.shutdown().await;
        let metrics = pool.metrics();
        assert_eq!(metrics.destroyed, 1);
    }
}
