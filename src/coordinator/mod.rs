//! The Coordinator (Master): composes [`crate::task_queue::TaskQueue`],
//! [`crate::task_index::TaskIndex`], and [`crate::worker_registry::WorkerRegistry`]
//! behind the HTTP surface in §6, plus the periodic staleness sweep (§4.4 step 5).

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
mod json;
pub mod routes;
pub mod state;

pub use config::CoordinatorConfig;
pub use state::CoordinatorState;

use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Bounded grace period the HTTP server is allowed to spend draining
/// in-flight requests after shutdown is requested (§5).
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Binds `config.bind_addr`, serves the router until `cancel` fires, and
/// runs the staleness sweep loop alongside it. Returns once the server has
/// drained (or the grace period elapses, whichever comes first).
pub async fn serve(config: CoordinatorConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr.clone();
    let state = CoordinatorState::new(config);

    let sweep_state = state.clone();
    let sweep_cancel = cancel.clone();
    tokio::spawn(async move {
        staleness_sweep_loop(sweep_state, sweep_cancel).await;
    });

    let listener = TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "coordinator listening");
    let router = routes::build_router(state);

    let shutdown_cancel = cancel.clone();
    let serve_fut = axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown_cancel.cancelled().await });

    tokio::select! {
        result = serve_fut => result.map_err(Into::into),
        () = hard_shutdown_deadline(cancel) => {
            info!("shutdown grace period elapsed, dropping remaining connections");
            Ok(())
        }
    }
}

async fn hard_shutdown_deadline(cancel: CancellationToken) {
    cancel.cancelled().await;
    tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
}

/// Every `HeartbeatInterval`, flips workers whose heartbeat has lapsed to
/// `Offline` (§4.2/§4.4 step 5).
async fn staleness_sweep_loop(state: CoordinatorState, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(state.config.heartbeat_interval);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                state.registry.sweep();
            }
        }
    }
}
