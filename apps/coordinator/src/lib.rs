//! Coordinator service.
//!
//! Owns the store-side observers that don't belong to any one worker: the
//! [`broker_core::Reclaimer`] sweep loop, the [`broker_events::EventBroadcaster`]
//! (which backs the `/ws/monitor/:id` and `/ws/client/:id` routes), the
//! [`broker_events::StatsTicker`], and an admin HTTP surface (`/healthz`, `/readyz`,
//! `/metrics`). Stateless beyond its in-process connection registries — more than
//! one instance may run against the same store (§6.7).

mod health;

use std::sync::Arc;

use axum::Router;
use broker_core::{JobRepository, Reclaimer, ReclaimerConfig};
use broker_events::{events_router, BroadcasterConfig, EventBroadcaster, EventsState, StatsTicker};
use broker_store::{RedisStore, Store};
use core_config::{Environment, FromEnv};
use database::redis::{connect_from_config_with_retry, RedisConfig};
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use health::{health_router, HealthState};

const SERVICE_NAME: &str = "coordinator";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runs the coordinator until it receives SIGINT/SIGTERM, then drains its
/// background loops before returning.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);
    observability::init_metrics();

    info!(name = SERVICE_NAME, version = SERVICE_VERSION, ?environment, "starting coordinator");

    let redis_config = RedisConfig::from_env().wrap_err("failed to load Redis configuration")?;
    let conn = connect_from_config_with_retry(redis_config.clone(), None)
        .await
        .wrap_err("failed to connect to Redis")?;
    let client = redis::Client::open(redis_config.url.as_str()).wrap_err("invalid Redis URL")?;
    let store: Arc<dyn Store> = Arc::new(RedisStore::new(conn, client));

    let reclaimer_config = ReclaimerConfig::from_env().wrap_err("failed to load reclaimer configuration")?;
    let broadcaster_config = BroadcasterConfig::from_env().wrap_err("failed to load broadcaster configuration")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("error waiting for shutdown signal: {e}");
        }
        let _ = shutdown_tx.send(true);
    });

    let reclaimer = Reclaimer::new(store.clone(), reclaimer_config);
    let reclaimer_shutdown = shutdown_rx.clone();
    let reclaimer_task = tokio::spawn(reclaimer.run(reclaimer_shutdown));

    let broadcaster = EventBroadcaster::new(store.clone(), &broadcaster_config);
    let broadcaster_shutdown = shutdown_rx.clone();
    let broadcaster_for_run = broadcaster.clone();
    let broadcaster_task = tokio::spawn(async move { broadcaster_for_run.run(broadcaster_shutdown).await });

    let stats_ticker = StatsTicker::new(store.clone(), broadcaster.monitors(), broadcaster_config.stats_interval_ms);
    let stats_shutdown = shutdown_rx.clone();
    let stats_task = tokio::spawn(stats_ticker.run(stats_shutdown));

    let events_state = EventsState {
        broadcaster,
        job_repository: JobRepository::new(store.clone()),
    };
    let health_state = HealthState {
        store: store.clone(),
        name: SERVICE_NAME,
        version: SERVICE_VERSION,
    };
    let app: Router = Router::new()
        .merge(health_router(health_state))
        .merge(events_router(events_state))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let server_config = core_config::server::ServerConfig::from_env().unwrap_or_default();
    let listener = TcpListener::bind(server_config.address())
        .await
        .wrap_err_with(|| format!("failed to bind {}", server_config.address()))?;
    info!(address = %server_config.address(), "coordinator listening");

    let mut server_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await
        .wrap_err("admin server failed")?;

    let _ = tokio::join!(reclaimer_task, broadcaster_task, stats_task);
    info!("coordinator stopped");
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
