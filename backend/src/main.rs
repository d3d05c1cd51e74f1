//! Backend entry-point: runs the order persistence worker until SIGINT or
//! SIGTERM.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::sync::Arc;

use color_eyre::eyre::{Context, Result, eyre};
use ortho_config::OrthoConfig;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use promo_backend::domain::{DistributedLock, OrderPersistenceWorker, OrderWorkerPorts};
use promo_backend::outbound::persistence::{DbPool, DieselOrderRepository};
use promo_backend::outbound::redis::{RedisKeyValueStore, RedisOrderQueue, RedisPool};
use promo_backend::settings::PromoSettings;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings =
        PromoSettings::load().map_err(|err| eyre!("failed to load configuration: {err}"))?;
    let db_config = settings
        .db_pool_config()
        .ok_or_else(|| eyre!("PROMO_DATABASE_URL must be set to run the order worker"))?;

    let redis = RedisPool::new(settings.redis_pool_config())
        .await
        .wrap_err("create redis pool")?;
    let db = DbPool::new(db_config)
        .await
        .wrap_err("create database pool")?;

    let store = Arc::new(RedisKeyValueStore::new(redis.clone()));
    let queue = Arc::new(RedisOrderQueue::new(redis, settings.stream_consumer()));
    let repository = Arc::new(DieselOrderRepository::new(db));
    let worker = OrderPersistenceWorker::new(
        OrderWorkerPorts::new(queue, repository),
        DistributedLock::new(store),
        settings.worker_config(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });
    info!(
        stream = settings.stream_key(),
        group = settings.consumer_group(),
        consumer = settings.consumer_name(),
        "order worker started"
    );

    shutdown_signal().await?;
    info!("shutdown requested, draining in-flight order");
    // The worker may already have exited; a closed channel is not an error.
    let _ = shutdown_tx.send(true);
    handle.await.wrap_err("order worker task panicked")?;
    info!("order worker stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).wrap_err("install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.wrap_err("listen for SIGINT"),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.wrap_err("listen for SIGINT")
}
