//! Subscribes once to every broker pub/sub channel and fans each event out to the
//! monitor and EmProps-client registries in their respective wire formats (§4.10).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use broker_core::keys::channels;
use broker_core::BrokerEvent;
use broker_store::Store;
use tokio::sync::{watch, RwLock};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::chunk;
use crate::config::BroadcasterConfig;
use crate::error::EventsResult;
use crate::registry::ConnectionRegistry;
use crate::wire::{emprops, monitor};

pub struct EventBroadcaster {
    store: Arc<dyn Store>,
    monitors: Arc<ConnectionRegistry>,
    clients: Arc<ConnectionRegistry>,
    /// `job_id -> client_id` for EmProps scoping (§6.4: clients see only their own
    /// jobs). Populated by the `/ws/client/:id` route on `submit_job`.
    job_owners: RwLock<HashMap<String, String>>,
    config: BroadcasterConfig,
}

impl EventBroadcaster {
    pub fn new(store: Arc<dyn Store>, config: &BroadcasterConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            monitors: ConnectionRegistry::new("monitor", config.socket_queue_capacity),
            clients: ConnectionRegistry::new("client", config.socket_queue_capacity),
            job_owners: RwLock::new(HashMap::new()),
            config: config.clone(),
        })
    }

    pub fn monitors(&self) -> Arc<ConnectionRegistry> {
        self.monitors.clone()
    }

    pub fn clients(&self) -> Arc<ConnectionRegistry> {
        self.clients.clone()
    }

    pub async fn register_job_owner(&self, job_id: String, client_id: String) {
        self.job_owners.write().await.insert(job_id, client_id);
    }

    /// Drives the fan-out loop until `shutdown` reports `true`.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> EventsResult<()> {
        let channel_names: Vec<String> = channels::ALL.iter().map(|c| c.to_string()).collect();
        let mut events = self.store.subscribe(&channel_names).await?;

        loop {
            tokio::select! {
                message = events.recv() => {
                    let Some(message) = message else {
                        warn!("pub/sub channel closed, broadcaster stopping");
                        break;
                    };
                    self.dispatch(&message.payload).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&self, payload: &str) {
        let event: BrokerEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("dropping malformed event payload: {e}");
                return;
            }
        };

        if let Some(monitor_msg) = monitor::from_broker_event(&event) {
            if let Ok(json) = serde_json::to_string(&monitor_msg) {
                for frame in self.frames_for(&json) {
                    self.monitors.broadcast(frame).await;
                }
            }
        }

        if let Some(job_id) = job_id_of(&event) {
            let owner = self.job_owners.read().await.get(job_id).cloned();
            if let Some(client_id) = owner {
                if let Some(client_msg) = emprops::from_broker_event(&event, |_| true) {
                    if let Ok(json) = serde_json::to_string(&client_msg) {
                        for frame in self.frames_for(&json) {
                            self.clients.send_to(&client_id, frame).await;
                        }
                    }
                }
            }
        }
    }

    /// Splits `payload` into chunk frames when it exceeds `max_message_bytes`
    /// (§4.10); each chunk is its own JSON text message, self-describing via its
    /// `chunk_id`/`index`/`total` fields so the receiver can reassemble it.
    fn frames_for(&self, payload: &str) -> Vec<Message> {
        let chunk_id = Uuid::new_v4().to_string();
        match chunk::chunk_if_needed(
            &chunk_id,
            payload.as_bytes(),
            self.config.max_message_bytes,
            self.config.chunk_bytes,
        ) {
            Some(envelopes) => envelopes
                .into_iter()
                .filter_map(|envelope| serde_json::to_string(&envelope).ok())
                .map(|json| Message::Text(json.into()))
                .collect(),
            None => vec![Message::Text(payload.to_string().into())],
        }
    }
}

fn job_id_of(event: &BrokerEvent) -> Option<&str> {
    match event {
        BrokerEvent::JobSubmitted { job_id, .. }
        | BrokerEvent::JobAssigned { job_id, .. }
        | BrokerEvent::JobProgress { job_id, .. }
        | BrokerEvent::JobCompleted { job_id, .. }
        | BrokerEvent::JobFailed { job_id, .. }
        | BrokerEvent::JobCancelled { job_id, .. } => Some(job_id.as_str()),
        BrokerEvent::WorkerStatus { .. }
        | BrokerEvent::WorkerRegistered { .. }
        | BrokerEvent::WorkerDisconnected { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_store::MockStore;

    #[tokio::test]
    async fn dispatch_forwards_job_progress_to_monitors() {
        let store = MockStore::new();
        let broadcaster = EventBroadcaster::new(Arc::new(store), &BroadcasterConfig::default());
        let mut rx = broadcaster.monitors().register("m-1".to_string()).await;

        let event = BrokerEvent::JobProgress {
            job_id: "j-1".into(),
            worker_id: "w-1".into(),
            progress: 50,
            status: "processing".into(),
            message: None,
            timestamp: 0,
        };
        broadcaster.dispatch(&event.to_json()).await;

        let message = rx.recv().await.unwrap();
        let Message::Text(text) = message else { panic!("expected text message") };
        assert!(text.contains("job_progress"));
    }

    #[tokio::test]
    async fn dispatch_routes_emprops_message_only_to_job_owner() {
        let store = MockStore::new();
        let broadcaster = EventBroadcaster::new(Arc::new(store), &BroadcasterConfig::default());
        broadcaster.register_job_owner("j-1".to_string(), "c-1".to_string()).await;

        let mut owner_rx = broadcaster.clients().register("c-1".to_string()).await;
        let mut other_rx = broadcaster.clients().register("c-2".to_string()).await;

        let event = BrokerEvent::JobCompleted {
            job_id: "j-1".into(),
            worker_id: "w-1".into(),
            result: serde_json::json!({"ok": true}),
            timestamp: 0,
        };
        broadcaster.dispatch(&event.to_json()).await;

        assert!(owner_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dispatch_chunks_payloads_over_the_configured_limit() {
        let store = MockStore::new();
        let mut config = BroadcasterConfig::default();
        config.max_message_bytes = 16;
        config.chunk_bytes = 16;
        let broadcaster = EventBroadcaster::new(Arc::new(store), &config);
        let mut rx = broadcaster.monitors().register("m-1".to_string()).await;

        let event = BrokerEvent::JobProgress {
            job_id: "j-1".into(),
            worker_id: "w-1".into(),
            progress: 50,
            status: "processing".into(),
            message: Some("a fairly long progress message to force chunking".into()),
            timestamp: 0,
        };
        broadcaster.dispatch(&event.to_json()).await;

        let Message::Text(first) = rx.recv().await.unwrap() else { panic!("expected text message") };
        let envelope: crate::chunk::ChunkEnvelope = serde_json::from_str(&first).unwrap();
        assert!(envelope.total > 1);
    }
}
