//! Outbox dispatcher process: drains committed events to the bus.
//!
//! Configuration comes from the environment here in the binary; the
//! library itself never reads it. The dispatcher gets its own connection
//! pool so drain bursts cannot starve request-serving mutators.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use mockable::DefaultClock;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use kernel_store::domain::dispatcher::{DispatcherConfig, OutboxDispatcher};
use kernel_store::domain::ports::NoOpDispatcherMetrics;
use kernel_store::outbound::bus::{BusConfig, JetStreamEventBus};
use kernel_store::outbound::persistence::{DbPool, DieselOutboxRepository, PoolConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/kernel".into());
    let nats_url = env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".into());
    let poll_interval = env_duration_secs("OUTBOX_POLL_INTERVAL_SECS", 5);
    let batch_size = env::var("OUTBOX_BATCH_SIZE")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(100);
    let worker_id = env::var("OUTBOX_WORKER_ID").unwrap_or_else(|_| {
        format!("outbox-dispatcher-{}", std::process::id())
    });

    // Half the default pool: the dispatcher must not starve mutators
    // sharing the database.
    let pool = DbPool::new(PoolConfig::new(&database_url).with_max_size(5)).await?;
    let bus = JetStreamEventBus::new(BusConfig::new(&nats_url)).await?;

    let dispatcher = Arc::new(OutboxDispatcher::new(
        Arc::new(DieselOutboxRepository::new(pool)),
        Arc::new(bus),
        Arc::new(NoOpDispatcherMetrics),
        Arc::new(DefaultClock),
        DispatcherConfig {
            poll_interval,
            batch_size,
            worker_id,
            ..DispatcherConfig::default()
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pending = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        let shutdown = shutdown_rx.clone();
        async move { dispatcher.run_pending_worker(shutdown).await }
    });
    let retry = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        let shutdown = shutdown_rx.clone();
        async move { dispatcher.run_retry_worker(shutdown).await }
    });
    let sweeper = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        let shutdown = shutdown_rx;
        async move { dispatcher.run_sweeper(shutdown).await }
    });

    info!("outbox dispatcher running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(pending, retry, sweeper);
    Ok(())
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(default_secs))
}
