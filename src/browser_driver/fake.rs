//! In-memory [`BrowserDriver`] fake used by pool and pipeline unit tests.
//!
//! Records every call so tests can assert on call order and arguments without
//! spending a real Chrome process per test, the same "fake over mock" shape
//! the crawler pack's own pool tests use.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BrowserDriver, DeviceMetrics, DriverError, NavigationOutcome, ProxyCredentials, ResourceType};

#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    OpenTab,
    DiscardTab,
    SetUserAgent(String),
    SetDeviceMetrics,
    SetTimezone(String),
    EnableFetchInterception,
    OnAuthRequired(bool),
    EvaluateScript(String),
    Navigate { url: String, referrer: Option<String> },
    ClearCookies,
    ClearCache,
    DispatchMouseMove { x: f64, y: f64 },
    Terminate,
}

/// Fake driver whose behavior is controlled by a handful of knobs:
/// `fail_navigation` makes every `navigate` return a [`DriverError::Navigation`],
/// `alive` controls `is_alive`, and `tab_open` tracks whether a tab is open so
/// tests can assert the pool never calls tab operations without one.
pub struct FakeDriver {
    calls: Mutex<Vec<FakeCall>>,
    tab_open: AtomicBool,
    alive: AtomicBool,
    terminated: AtomicBool,
    fail_navigation: AtomicBool,
    navigation_status: AtomicU32,
    open_tab_count: AtomicU32,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            tab_open: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            fail_navigation: AtomicBool::new(false),
            navigation_status: AtomicU32::new(200),
            open_tab_count: AtomicU32::new(0),
        }
    }

    pub fn set_fail_navigation(&self, fail: bool) {
        self.fail_navigation.store(fail, Ordering::SeqCst);
    }

    pub fn set_navigation_status(&self, status: u16) {
        self.navigation_status.store(status as u32, Ordering::SeqCst);
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().clone()
    }

    #[must_use]
    pub fn open_tab_count(&self) -> u32 {
        self.open_tab_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn record(&self, call: FakeCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open_tab(&self) -> Result<(), DriverError> {
        self.tab_open.store(true, Ordering::SeqCst);
        self.open_tab_count.fetch_add(1, Ordering::SeqCst);
        self.record(FakeCall::OpenTab);
        Ok(())
    }

    async fn discard_tab(&self) -> Result<(), DriverError> {
        self.tab_open.store(false, Ordering::SeqCst);
        self.record(FakeCall::DiscardTab);
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), DriverError> {
        self.record(FakeCall::SetUserAgent(user_agent.to_string()));
        Ok(())
    }

    async fn set_device_metrics(&self, _metrics: DeviceMetrics) -> Result<(), DriverError> {
        self.record(FakeCall::SetDeviceMetrics);
        Ok(())
    }

    async fn set_timezone(&self, timezone: &str) -> Result<(), DriverError> {
        self.record(FakeCall::SetTimezone(timezone.to_string()));
        Ok(())
    }

    async fn enable_fetch_interception(
        &self,
        allow: Box<dyn Fn(ResourceType) -> bool + Send + Sync>,
    ) -> Result<(), DriverError> {
        // Exercise the predicate once so tests can verify it was wired up,
        // mirroring how the real driver invokes it per intercepted request.
        let _ = allow(ResourceType::Document);
        self.record(FakeCall::EnableFetchInterception);
        Ok(())
    }

    async fn on_auth_required(&self, credentials: Option<ProxyCredentials>) -> Result<(), DriverError> {
        self.record(FakeCall::OnAuthRequired(credentials.is_some()));
        Ok(())
    }

    async fn evaluate_script(&self, script: &str) -> Result<(), DriverError> {
        if !self.tab_open.load(Ordering::SeqCst) {
            return Err(DriverError::OpenTab("evaluate_script: no tab open".into()));
        }
        self.record(FakeCall::EvaluateScript(script.to_string()));
        Ok(())
    }

    async fn navigate(&self, url: &str, referrer: Option<&str>) -> Result<NavigationOutcome, DriverError> {
        self.record(FakeCall::Navigate {
            url: url.to_string(),
            referrer: referrer.map(str::to_string),
        });
        if self.fail_navigation.load(Ordering::SeqCst) {
            return Err(DriverError::Navigation("fake navigation failure".into()));
        }
        Ok(NavigationOutcome {
            status_code: self.navigation_status.load(Ordering::SeqCst) as u16,
            elapsed: Duration::from_millis(5),
        })
    }

    async fn clear_cookies(&self) -> Result<(), DriverError> {
        self.record(FakeCall::ClearCookies);
        Ok(())
    }

    async fn clear_cache(&self) -> Result<(), DriverError> {
        self.record(FakeCall::ClearCache);
        Ok(())
    }

    async fn dispatch_mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.record(FakeCall::DispatchMouseMove { x, y });
        Ok(())
    }

    async fn terminate(&self) -> Result<(), DriverError> {
        self.terminated.store(true, Ordering::SeqCst);
        self.tab_open.store(false, Ordering::SeqCst);
        self.record(FakeCall::Terminate);
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let driver = FakeDriver::new();
        driver.open_tab().await.unwrap();
        driver.set_user_agent("UA/1.0").await.unwrap();
        driver.navigate("http://example.com", None).await.unwrap();

        let calls = driver.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], FakeCall::OpenTab);
        assert!(matches!(calls[2], FakeCall::Navigate { .. }));
    }

    #[tokio::test]
    async fn evaluate_script_requires_open_tab() {
        let driver = FakeDriver::new();
        let err = driver.evaluate_script("1+1").await.unwrap_err();
        assert!(matches!(err, DriverError::OpenTab(_)));
    }

    #[tokio::test]
    async fn navigation_failure_is_toggleable() {
        let driver = FakeDriver::new();
        driver.set_fail_navigation(true);
        assert!(driver.navigate("http://example.com", None).await.is_err());
        driver.set_fail_navigation(false);
        assert!(driver.navigate("http://example.com", None).await.is_ok());
    }

    #[tokio::test]
    async fn terminate_marks_terminated_and_closes_tab() {
        let driver = FakeDriver::new();
        driver.open_tab().await.unwrap();
        driver.terminate().await.unwrap();
        assert!(driver.is_terminated());
        assert!(driver.evaluate_script("1").await.is_err());
    }
}
