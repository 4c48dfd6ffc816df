//! `dispatch-worker`: registers with a coordinator, maintains a local
//! [`BrowserPool`], and drains tasks through the [`VisitPipeline`] (§4.5).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dispatch_engine::browser_driver::chromiumoxide_driver::{ChromiumoxideDriver, ChromiumoxideDriverFactory};
use dispatch_engine::worker::processor::PoolVisitProcessor;
use dispatch_engine::{BrowserPool, BrowserPoolConfig, ReferrerPolicy, Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dispatch-worker", about = "Browser-visit worker for the dispatch engine")]
struct Args {
    /// Base URL of the coordinator to register with.
    #[arg(long, env = "DISPATCH_MASTER_URL", default_value = "http://127.0.0.1:8080")]
    master_url: String,

    /// Shared secret matching the coordinator's `SecretKey`, if configured.
    #[arg(long, env = "DISPATCH_SECRET_KEY", default_value = "")]
    secret_key: String,

    /// Number of concurrent dispatch loops (and the pool's effective demand).
    #[arg(long, env = "DISPATCH_MAX_CONCURRENCY", default_value_t = 4)]
    max_concurrency: u32,

    #[arg(long, env = "DISPATCH_HOSTNAME")]
    hostname: Option<String>,

    #[arg(long, env = "DISPATCH_MAX_INSTANCES", default_value_t = 10)]
    max_instances: usize,

    #[arg(long, env = "DISPATCH_MIN_INSTANCES", default_value_t = 2)]
    min_instances: usize,

    #[arg(long, env = "DISPATCH_HEADLESS", default_value_t = true)]
    headless: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let hostname = args
        .hostname
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown-host".to_string());

    let pool_config = BrowserPoolConfig {
        min_instances: args.min_instances,
        max_instances: args.max_instances,
        acquire_timeout: Duration::from_secs(30),
        instance_max_age: Duration::from_secs(30 * 60),
        instance_max_sessions: 200,
        headless: args.headless,
    };
    let factory = Arc::new(ChromiumoxideDriverFactory { headless: args.headless });
    let pool: Arc<BrowserPool<ChromiumoxideDriver>> = BrowserPool::new(pool_config);
    pool.start(Arc::clone(&factory)).await?;

    let processor = Arc::new(PoolVisitProcessor::new(Arc::clone(&pool), factory, ReferrerPolicy::none()));

    let worker_config = WorkerConfig {
        master_url: args.master_url,
        secret_key: args.secret_key,
        max_concurrency: args.max_concurrency,
        hostname,
        ..WorkerConfig::default()
    };
    let worker = Worker::new(worker_config, processor)?;

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_cancel.cancel();
    });

    let run_result = worker.run(cancel).await;
    pool.shutdown().await;
    run_result?;
    Ok(())
}
