//! `/healthz` (liveness) and `/readyz` (readiness, pings the store) — modeled on the
//! teacher's now-removed `stream-worker::health` router (§2.2, §6.7).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use broker_store::Store;
use observability::metrics_handler;
use serde_json::json;

#[derive(Clone)]
pub struct HealthState {
    pub store: Arc<dyn Store>,
    pub name: &'static str,
    pub version: &'static str,
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz(State(state): State<HealthState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": state.name, "version": state.version }))
}

async fn readyz(State(state): State<HealthState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "error": e.to_string() })),
        )
            .into_response(),
    }
}
