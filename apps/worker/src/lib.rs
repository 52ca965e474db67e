//! Worker service.
//!
//! Owns one [`broker_runtime::WorkerRuntime`] wired to [`broker_connector::SimConnector`]
//! — the only connector shipping in this workspace (§6.2, §6.7) — plus its own
//! `/healthz` for container orchestration.

mod config;
mod health;

use std::sync::Arc;

use broker_connector::SimConnector;
use broker_core::BrokerConfig;
use broker_runtime::{WorkerRuntime, WorkerRuntimeConfig};
use broker_store::{RedisStore, Store};
use core_config::{Environment, FromEnv};
use database::redis::{connect_from_config_with_retry, RedisConfig};
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use config::WorkerAppConfig;
use health::{health_router, HealthState};

const SERVICE_NAME: &str = "worker";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);
    observability::init_metrics();

    let worker_config = WorkerAppConfig::from_env().wrap_err("failed to load worker configuration")?;
    info!(
        worker_id = %worker_config.worker_id,
        machine_id = %worker_config.machine_id,
        services = ?worker_config.capabilities.services,
        "starting worker"
    );

    let redis_config = RedisConfig::from_env().wrap_err("failed to load Redis configuration")?;
    let conn = connect_from_config_with_retry(redis_config.clone(), None)
        .await
        .wrap_err("failed to connect to Redis")?;
    let client = redis::Client::open(redis_config.url.as_str()).wrap_err("invalid Redis URL")?;
    let store: Arc<dyn Store> = Arc::new(RedisStore::new(conn, client));

    let broker_config = BrokerConfig::from_env().wrap_err("failed to load broker configuration")?;
    let runtime_config = WorkerRuntimeConfig::from_env().wrap_err("failed to load worker runtime configuration")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("error waiting for shutdown signal: {e}");
        }
        let _ = shutdown_tx.send(true);
    });

    let connector = Arc::new(SimConnector::default());
    let runtime = WorkerRuntime::new(
        store,
        connector,
        worker_config.worker_id.clone(),
        worker_config.machine_id.clone(),
        worker_config.capabilities.clone(),
        broker_config,
        runtime_config,
    );

    let health_state = HealthState {
        name: SERVICE_NAME,
        version: SERVICE_VERSION,
        worker_id: worker_config.worker_id.clone(),
    };
    let health_port = worker_config.health_port;
    let health_shutdown = shutdown_rx.clone();
    let health_task = tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port, health_shutdown).await {
            error!("health server failed: {e}");
        }
    });

    runtime.run(shutdown_rx).await.wrap_err("worker runtime failed")?;
    let _ = health_task.await;

    info!("worker stopped");
    Ok(())
}

async fn start_health_server(state: HealthState, port: u16, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let app = health_router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind health server to {addr}"))?;
    info!(%addr, "worker health server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .wrap_err("health server failed")?;
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, initiating shutdown"),
        _ = terminate => info!("received SIGTERM, initiating shutdown"),
    }

    Ok(())
}
