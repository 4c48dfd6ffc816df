//! [`ChromiumoxideDriver`]: the [`BrowserDriver`] implementation the pool uses
//! in production, backed by a single launched Chrome process.
//!
//! One driver instance owns one `chromiumoxide::Browser` plus its CDP event
//! handler task; `open_tab`/`discard_tab` create and drop the single `Page` the
//! pool treats as "the" tab for that instance, rather than tearing the process
//! down between visits. Launch and profile-directory handling are unchanged
//! from the crawler's original launcher.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, DisableParams as FetchDisableParams, EnableParams as FetchEnableParams,
    EventAuthRequired, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCacheParams, ClearBrowserCookiesParams, ErrorReason,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::browser_profile::{create_unique_profile_with_prefix, BrowserProfile};
use crate::browser_setup::launch_browser;

use super::{DeviceMetrics, DriverError, NavigationOutcome, ProxyCredentials, ResourceType};

/// Classifies a Fetch-intercepted resource type string into the driver's
/// resource classification (§4.7 step 2).
fn classify_resource(kind: &str) -> ResourceType {
    match kind {
        "Document" => ResourceType::Document,
        "Script" => ResourceType::Script,
        "Image" => ResourceType::Image,
        "Stylesheet" => ResourceType::Stylesheet,
        "Font" => ResourceType::Font,
        "Media" => ResourceType::Media,
        _ => ResourceType::Other,
    }
}

struct TabState {
    page: Page,
    auth_credentials: SyncMutex<Option<ProxyCredentials>>,
    intercept_task: SyncMutex<Option<JoinHandle<()>>>,
    auth_task: SyncMutex<Option<JoinHandle<()>>>,
}

/// One launched Chrome process, exposed as a [`BrowserDriver`].
///
/// `tab` is `None` between `discard_tab`/construction and the next `open_tab`;
/// every other trait method expects it to be `Some` and returns
/// [`DriverError::OpenTab`] otherwise, matching the teacher's own "driver is
/// single-tab-at-a-time" model in `browser_pool::PooledBrowserWrapper`.
pub struct ChromiumoxideDriver {
    browser: Arc<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
    tab: Mutex<Option<TabState>>,
    profile: Mutex<Option<BrowserProfile>>,
    profile_path: PathBuf,
}

impl ChromiumoxideDriver {
    /// Launches a fresh Chrome process in a unique, auto-cleaned profile
    /// directory and returns a driver with no open tab yet.
    pub async fn launch(headless: bool) -> Result<Self, DriverError> {
        let profile = create_unique_profile_with_prefix("dispatch_engine_chrome")
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        let profile_path = profile.path().to_path_buf();

        let (browser, handler, _user_data_dir) =
            launch_browser(headless, Some(profile_path.clone()))
                .await
                .map_err(|e| DriverError::Launch(e.to_string()))?;

        Ok(Self {
            browser: Arc::new(browser),
            handler: Mutex::new(Some(handler)),
            tab: Mutex::new(None),
            profile: Mutex::new(Some(profile)),
            profile_path,
        })
    }

    pub fn profile_path(&self) -> &std::path::Path {
        &self.profile_path
    }

    async fn with_tab<F, R>(&self, op: &str, f: F) -> Result<R, DriverError>
    where
        F: FnOnce(&Page) -> R,
    {
        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab(format!("{op}: no tab open")))?;
        Ok(f(&tab.page))
    }
}

#[async_trait]
impl super::BrowserDriver for ChromiumoxideDriver {
    async fn open_tab(&self) -> Result<(), DriverError> {
        let mut guard = self.tab.lock().await;
        if let Some(old) = guard.take() {
            if let Some(t) = old.intercept_task.lock().take() {
                t.abort();
            }
            if let Some(t) = old.auth_task.lock().take() {
                t.abort();
            }
            let _ = old.page.close().await;
        }

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::OpenTab(e.to_string()))?;

        *guard = Some(TabState {
            page,
            auth_credentials: SyncMutex::new(None),
            intercept_task: SyncMutex::new(None),
            auth_task: SyncMutex::new(None),
        });
        Ok(())
    }

    async fn discard_tab(&self) -> Result<(), DriverError> {
        let mut guard = self.tab.lock().await;
        if let Some(tab) = guard.take() {
            if let Some(t) = tab.intercept_task.lock().take() {
                t.abort();
            }
            if let Some(t) = tab.auth_task.lock().take() {
                t.abort();
            }
            tab.page
                .close()
                .await
                .map_err(|e| DriverError::Navigation(format!("close tab: {e}")))?;
        }
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), DriverError> {
        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab("set_user_agent: no tab open".into()))?;
        tab.page
            .set_user_agent(user_agent)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(())
    }

    async fn set_device_metrics(&self, metrics: DeviceMetrics) -> Result<(), DriverError> {
        use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;

        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab("set_device_metrics: no tab open".into()))?;
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(metrics.width as i64)
            .height(metrics.height as i64)
            .device_scale_factor(metrics.device_pixel_ratio)
            .mobile(metrics.mobile)
            .build()
            .map_err(DriverError::Script)?;
        tab.page
            .execute(params)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(())
    }

    async fn set_timezone(&self, timezone: &str) -> Result<(), DriverError> {
        use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;

        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab("set_timezone: no tab open".into()))?;
        tab.page
            .execute(SetTimezoneOverrideParams::new(timezone))
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(())
    }

    async fn enable_fetch_interception(
        &self,
        allow: Box<dyn Fn(ResourceType) -> bool + Send + Sync>,
    ) -> Result<(), DriverError> {
        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab("enable_fetch_interception: no tab open".into()))?;

        let patterns = vec![RequestPattern::builder().url_pattern("*").build()];
        tab.page
            .execute(FetchEnableParams::builder().patterns(patterns).build())
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;

        let mut events = tab
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        let page = tab.page.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let kind = event
                    .resource_type
                    .as_ref()
                    .map(|t| t.inner().as_str())
                    .unwrap_or("Other");
                let allowed = allow(classify_resource(kind));
                let result = if allowed {
                    page.execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                } else {
                    page.execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                };
                if let Err(e) = result {
                    trace!(error = %e, "fetch interception response failed");
                }
            }
        });
        *tab.intercept_task.lock() = Some(handle);
        Ok(())
    }

    async fn on_auth_required(&self, credentials: Option<ProxyCredentials>) -> Result<(), DriverError> {
        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab("on_auth_required: no tab open".into()))?;

        *tab.auth_credentials.lock() = credentials;

        let mut events = tab
            .page
            .event_listener::<EventAuthRequired>()
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        let page = tab.page.clone();
        let creds = SyncMutex::new(tab.auth_credentials.lock().clone());
        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let response = match creds.lock().clone() {
                    Some(ProxyCredentials { username, password }) => {
                        chromiumoxide::cdp::browser_protocol::fetch::AuthChallengeResponse::builder()
                            .response(
                                chromiumoxide::cdp::browser_protocol::fetch::AuthChallengeResponseResponse::ProvideCredentials,
                            )
                            .username(username)
                            .password(password)
                            .build()
                    }
                    None => chromiumoxide::cdp::browser_protocol::fetch::AuthChallengeResponse::builder()
                        .response(
                            chromiumoxide::cdp::browser_protocol::fetch::AuthChallengeResponseResponse::CancelAuth,
                        )
                        .build(),
                };
                let params = chromiumoxide::cdp::browser_protocol::fetch::ContinueWithAuthParams::new(
                    event.request_id.clone(),
                    response,
                );
                if let Err(e) = page.execute(params).await {
                    trace!(error = %e, "auth challenge response failed");
                }
            }
        });
        *tab.auth_task.lock() = Some(handle);
        Ok(())
    }

    async fn evaluate_script(&self, script: &str) -> Result<(), DriverError> {
        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab("evaluate_script: no tab open".into()))?;

        // Pre-navigation stealth scripts must survive a document change, so we
        // register them via AddScriptToEvaluateOnNewDocument as well as running
        // them immediately against the current document.
        tab.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::builder().source(script).build().map_err(DriverError::Script)?)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        tab.page
            .evaluate(EvaluateParams::builder().expression(script).build().map_err(DriverError::Script)?)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(())
    }

    async fn navigate(&self, url: &str, referrer: Option<&str>) -> Result<NavigationOutcome, DriverError> {
        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab("navigate: no tab open".into()))?;

        let start = Instant::now();
        let mut params = chromiumoxide::cdp::browser_protocol::page::NavigateParams::builder().url(url);
        if let Some(referrer) = referrer {
            params = params.referrer(referrer);
        }
        let params = params.build().map_err(DriverError::Navigation)?;

        let navigate_result = tab
            .page
            .execute(params)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;

        tab.page
            .wait_for_navigation()
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;

        let status_code = navigate_result
            .result
            .error_text
            .as_ref()
            .map(|_| 0u16)
            .unwrap_or(200);

        Ok(NavigationOutcome {
            status_code,
            elapsed: start.elapsed(),
        })
    }

    async fn clear_cookies(&self) -> Result<(), DriverError> {
        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab("clear_cookies: no tab open".into()))?;
        tab.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| DriverError::Reset(e.to_string()))?;
        Ok(())
    }

    async fn clear_cache(&self) -> Result<(), DriverError> {
        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab("clear_cache: no tab open".into()))?;
        tab.page
            .execute(ClearBrowserCacheParams::default())
            .await
            .map_err(|e| DriverError::Reset(e.to_string()))?;
        let _ = tab.page.execute(FetchDisableParams::default()).await;
        Ok(())
    }

    async fn dispatch_mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError> {
        use chromiumoxide::cdp::browser_protocol::input::{DispatchMouseEventParams, DispatchMouseEventType};

        let guard = self.tab.lock().await;
        let tab = guard
            .as_ref()
            .ok_or_else(|| DriverError::OpenTab("dispatch_mouse_move: no tab open".into()))?;
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
            .map_err(DriverError::Script)?;
        tab.page
            .execute(params)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(())
    }

    async fn terminate(&self) -> Result<(), DriverError> {
        {
            let mut guard = self.tab.lock().await;
            if let Some(tab) = guard.take() {
                if let Some(t) = tab.intercept_task.lock().take() {
                    t.abort();
                }
                if let Some(t) = tab.auth_task.lock().take() {
                    t.abort();
                }
                let _ = tab.page.close().await;
            }
        }
        if let Some(handle) = self.handler.lock().await.take() {
            handle.abort();
        }
        if let Some(profile) = self.profile.lock().await.take() {
            drop(profile);
        }
        info!(profile = %self.profile_path.display(), "chromiumoxide driver terminated");
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        let guard = self.tab.lock().await;
        match guard.as_ref() {
            Some(tab) => tab.page.url().await.is_ok(),
            None => false,
        }
    }
}

impl Drop for ChromiumoxideDriver {
    fn drop(&mut self) {
        debug!(profile = %self.profile_path.display(), "ChromiumoxideDriver dropped without explicit terminate()");
    }
}

/// [`crate::browser_pool::DriverFactory`] that launches a real Chrome process
/// per instance — the factory [`crate::browser_pool::BrowserPool`] is wired
/// with in production, as opposed to [`super::fake::FakeDriver`]'s factory in
/// unit tests.
pub struct ChromiumoxideDriverFactory {
    pub headless: bool,
}

#[async_trait]
impl crate::browser_pool::DriverFactory<ChromiumoxideDriver> for ChromiumoxideDriverFactory {
    async fn create(&self) -> Result<ChromiumoxideDriver, DriverError> {
        ChromiumoxideDriver::launch(self.headless).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_resource_maps_known_kinds() {
        assert_eq!(classify_resource("Document"), ResourceType::Document);
        assert_eq!(classify_resource("Xhr"), ResourceType::Other);
    }
}
