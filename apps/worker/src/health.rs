//! `/healthz` for container orchestration (§2.2, §6.7). A worker binary has no
//! readiness surface beyond the store connection it shares with its runtime, so
//! unlike the coordinator it exposes liveness only.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

#[derive(Clone)]
pub struct HealthState {
    pub name: &'static str,
    pub version: &'static str,
    pub worker_id: String,
}

pub fn health_router(state: HealthState) -> Router {
    Router::new().route("/healthz", get(healthz)).with_state(state)
}

async fn healthz(State(state): State<HealthState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": state.name,
        "version": state.version,
        "worker_id": state.worker_id,
    }))
}
