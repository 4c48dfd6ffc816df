//! `dispatch-master`: runs the Coordinator's HTTP surface (§6).

use std::time::Duration;

use clap::Parser;
use dispatch_engine::CoordinatorConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dispatch-master", about = "Coordinator for the browser-visit dispatch engine")]
struct Args {
    /// Address to bind the HTTP surface to.
    #[arg(long, env = "DISPATCH_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: String,

    /// Shared secret every mutating endpoint checks via `Authorization: Bearer <key>`.
    /// Empty disables auth — local use only.
    #[arg(long, env = "DISPATCH_SECRET_KEY", default_value = "")]
    secret_key: String,

    /// Soft cap on registered workers (informational; not enforced as a hard limit).
    #[arg(long, env = "DISPATCH_MAX_WORKERS", default_value_t = 100)]
    max_workers: usize,

    /// Seconds a worker may go without a heartbeat before being swept Offline
    /// is `2 * heartbeat_interval_secs`.
    #[arg(long, env = "DISPATCH_HEARTBEAT_INTERVAL_SECS", default_value_t = 10)]
    heartbeat_interval_secs: u64,

    /// Bounded FIFO queue capacity.
    #[arg(long, env = "DISPATCH_QUEUE_CAPACITY", default_value_t = 10_000)]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = CoordinatorConfig {
        bind_addr: args.bind_addr,
        secret_key: args.secret_key,
        max_workers: args.max_workers,
        task_timeout: Duration::from_secs(5 * 60),
        heartbeat_interval: Duration::from_secs(args.heartbeat_interval_secs),
        queue_capacity: args.queue_capacity,
        task_request_wait: Duration::from_secs(5),
    };

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_cancel.cancel();
    });

    dispatch_engine::coordinator::serve(config, cancel).await
}
