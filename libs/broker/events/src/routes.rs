//! `/ws/monitor/:id` and `/ws/client/:id` (§4.10's implementation note): composed
//! the same way `tasks-worker` composes its health router, so a binary merges this
//! with `/healthz`/`/readyz`/`/metrics` under one `axum::serve` call.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use broker_core::JobRepository;
use tracing::{debug, instrument};

use crate::broadcaster::EventBroadcaster;
use crate::registry::SLOW_CONSUMER_CLOSE_CODE;
use crate::wire::emprops::{EmpropsClientMessage, EmpropsMessage};

/// Sends an explicit close frame carrying [`SLOW_CONSUMER_CLOSE_CODE`] so the
/// client distinguishes "you fell behind, reconnect" from a normal disconnect.
async fn send_slow_consumer_close(socket: &mut WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: SLOW_CONSUMER_CLOSE_CODE,
            reason: "slow consumer".into(),
        })))
        .await;
}

#[derive(Clone)]
pub struct EventsState {
    pub broadcaster: Arc<EventBroadcaster>,
    pub job_repository: JobRepository,
}

/// Builds the two WebSocket routes. Merge into a binary's root router alongside
/// its admin routes.
pub fn events_router(state: EventsState) -> Router {
    Router::new()
        .route("/ws/monitor/{id}", get(monitor_handler))
        .route("/ws/client/{id}", get(client_handler))
        .with_state(state)
}

async fn monitor_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<EventsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_monitor_socket(socket, id, state))
}

#[instrument(skip(socket, state))]
async fn handle_monitor_socket(mut socket: WebSocket, id: String, state: EventsState) {
    let mut outgoing = state.broadcaster.monitors().register(id.clone()).await;

    loop {
        tokio::select! {
            outbound = outgoing.recv() => {
                let Some(message) = outbound else {
                    if state.broadcaster.monitors().take_overflow(&id).await {
                        send_slow_consumer_close(&mut socket).await;
                    }
                    break;
                };
                if socket.send(message).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // monitors don't send commands today
                    Some(Err(e)) => {
                        debug!("monitor {id} socket error: {e}");
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.monitors().remove(&id).await;
}

async fn client_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<EventsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client_socket(socket, id, state))
}

#[instrument(skip(socket, state))]
async fn handle_client_socket(mut socket: WebSocket, id: String, state: EventsState) {
    let mut outgoing = state.broadcaster.clients().register(id.clone()).await;

    let greeting = EmpropsMessage::ConnectionEstablished {
        message: "connected".to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    if let Ok(json) = serde_json::to_string(&greeting) {
        if socket.send(Message::Text(json.into())).await.is_err() {
            state.broadcaster.clients().remove(&id).await;
            return;
        }
    }

    loop {
        tokio::select! {
            outbound = outgoing.recv() => {
                let Some(message) = outbound else {
                    if state.broadcaster.clients().take_overflow(&id).await {
                        send_slow_consumer_close(&mut socket).await;
                    }
                    break;
                };
                if socket.send(message).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&mut socket, &id, &state, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("client {id} socket error: {e}");
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.clients().remove(&id).await;
}

async fn handle_client_message(socket: &mut WebSocket, client_id: &str, state: &EventsState, text: &str) {
    let Ok(EmpropsClientMessage::SubmitJob { spec }) = serde_json::from_str(text) else {
        debug!("client {client_id} sent an unrecognized message");
        return;
    };

    let now_ms = chrono::Utc::now().timestamp_millis();
    match state.job_repository.submit(spec, now_ms).await {
        Ok(job) => {
            state
                .broadcaster
                .register_job_owner(job.id.clone(), client_id.to_string())
                .await;
            let reply = EmpropsMessage::JobAccepted {
                job_id: job.id,
                status: "queued".to_string(),
                timestamp: now_ms,
            };
            if let Ok(json) = serde_json::to_string(&reply) {
                let _ = socket.send(Message::Text(json.into())).await;
            }
        }
        Err(e) => debug!("client {client_id} submit_job rejected: {e}"),
    }
}
