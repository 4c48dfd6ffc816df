//! Abstract [`BrowserDriver`] capability.
//!
//! The pool and the visit pipeline are written against this trait, not against
//! any particular browser automation surface. [`chromiumoxide_driver`] is the
//! one concrete implementation the core ships; anything satisfying the trait
//! (a different CDP client, a WebDriver client, a test fake) can stand in.

pub mod chromiumoxide_driver;
pub mod fake;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to launch browser process: {0}")]
    Launch(String),
    #[error("failed to open tab: {0}")]
    OpenTab(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("state reset failed: {0}")]
    Reset(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Resource type classification used by request interception (§4.7 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Document,
    Script,
    Image,
    Stylesheet,
    Font,
    Media,
    Other,
}

/// Device emulation parameters (§4.7 step 4).
#[derive(Debug, Clone, Copy)]
pub struct DeviceMetrics {
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f64,
    pub mobile: bool,
}

/// Outcome of a completed navigation: the final HTTP status (0 if no response
/// was ever received) and how long the navigation took.
#[derive(Debug, Clone, Copy)]
pub struct NavigationOutcome {
    pub status_code: u16,
    pub elapsed: Duration,
}

/// Proxy credentials supplied in response to a CDP `Fetch.authRequired` event
/// (§4.7 step 2, "respond with the supplied credentials").
#[derive(Debug, Clone)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

/// Minimum operations the visit pipeline needs from a single browser tab.
///
/// A driver implementation owns one underlying browser process/allocator and
/// may serve many tabs over its lifetime, but each `BrowserDriver` *instance*
/// as seen by the pool represents one currently-open tab context; `discard_tab`
/// plus a fresh `open_tab` is how [`crate::browser_pool`] resets it between uses.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a fresh tab on the underlying process, replacing any existing one.
    async fn open_tab(&self) -> Result<(), DriverError>;

    /// Discard the current tab context without terminating the process.
    async fn discard_tab(&self) -> Result<(), DriverError>;

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), DriverError>;

    async fn set_device_metrics(&self, metrics: DeviceMetrics) -> Result<(), DriverError>;

    async fn set_timezone(&self, timezone: &str) -> Result<(), DriverError>;

    /// Enable Fetch-domain request interception for the classification policy
    /// described in §4.7 step 2. `allow` is invoked per intercepted request;
    /// returning `true` lets it continue, `false` aborts it.
    async fn enable_fetch_interception(
        &self,
        allow: Box<dyn Fn(ResourceType) -> bool + Send + Sync>,
    ) -> Result<(), DriverError>;

    /// Register the proxy credentials to answer `Fetch.authRequired` challenges
    /// with, if a proxy requiring auth is configured for this visit.
    async fn on_auth_required(&self, credentials: Option<ProxyCredentials>) -> Result<(), DriverError>;

    /// Evaluate an opaque script payload in the page context. Used for stealth
    /// injection, canvas/audio noise, analytics stubs, and scripted interaction.
    async fn evaluate_script(&self, script: &str) -> Result<(), DriverError>;

    /// Navigate to `url`, optionally with a `Referer` header, and wait for a
    /// body-ready signal. Returns the outcome described above.
    async fn navigate(&self, url: &str, referrer: Option<&str>) -> Result<NavigationOutcome, DriverError>;

    async fn clear_cookies(&self) -> Result<(), DriverError>;

    async fn clear_cache(&self) -> Result<(), DriverError>;

    /// Dispatch a synthetic mouse-move event to `(x, y)` in page coordinates.
    /// Driven along a sampled Bézier curve by the visit pipeline's behavioral
    /// simulation (§4.7 step 8) — one call per sampled point.
    async fn dispatch_mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError>;

    /// Terminate the underlying process. Called only when the pool destroys an
    /// instance (recycle, reset failure, or shutdown) — never as part of Reset.
    async fn terminate(&self) -> Result<(), DriverError>;

    /// Cheap liveness probe used by the pool before handing an instance out.
    async fn is_alive(&self) -> bool;
}
