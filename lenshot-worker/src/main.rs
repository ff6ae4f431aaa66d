//! # Lenshot Worker
//!
//! Background worker that executes screenshot capture jobs.
//!
//! ## Architecture
//!
//! The worker:
//! - Claims pending jobs from Postgres with `FOR UPDATE SKIP LOCKED`
//! - Re-validates each target URL before capture (DNS rebinding defense)
//! - Runs captures concurrently under a per-job timeout
//! - Records terminal states and delivers signed webhooks
//! - Sweeps for jobs abandoned by dead workers
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lenshot-worker
//! ```

use lenshot_shared::db::pool::{create_pool, DatabaseConfig};
use lenshot_worker::capturer::MockCapturer;
use lenshot_worker::dispatcher::{Dispatcher, DispatcherConfig};
use lenshot_worker::notify::WebhookNotifier;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lenshot_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Lenshot Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let db = create_pool(DatabaseConfig::from_env()?).await?;

    let signing_secret = std::env::var("WEBHOOK_SIGNING_SECRET")
        .map_err(|_| anyhow::anyhow!("WEBHOOK_SIGNING_SECRET environment variable is required"))?;

    let config = DispatcherConfig {
        poll_interval: Duration::from_millis(env_or("WORKER_POLL_INTERVAL_MS", 1000)),
        max_concurrent: env_or("WORKER_MAX_CONCURRENT", 4),
        capture_timeout_seconds: env_or("WORKER_CAPTURE_TIMEOUT_SECONDS", 60),
        ..Default::default()
    };

    let dispatcher = Dispatcher::with_config(
        db,
        Arc::new(MockCapturer::new()),
        WebhookNotifier::new(&signing_secret),
        config,
    );
    let shutdown = dispatcher.shutdown_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, draining in-flight captures...");
            shutdown.cancel();
        }
    });

    dispatcher.run().await;
    tracing::info!("Worker stopped");

    Ok(())
}
