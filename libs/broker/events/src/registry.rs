//! Per-connection-kind registries (monitors, EmProps clients) keyed by connection
//! id. Each connection owns a bounded outgoing queue; a slow consumer's queue fills
//! up, `try_send` fails, and the registry evicts that sender and flags the
//! connection for a slow-consumer close so its socket-writer task can send a close
//! frame and the client reconnects with a clean channel (§4.10 "Backpressure").

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

/// WebSocket close code used when a consumer falls behind and its queue is
/// evicted; the client is expected to reconnect rather than treat this as fatal.
pub const SLOW_CONSUMER_CLOSE_CODE: u16 = 1008;

pub struct ConnectionRegistry {
    kind: &'static str,
    capacity: usize,
    senders: RwLock<HashMap<String, mpsc::Sender<Message>>>,
    overflowed: RwLock<HashSet<String>>,
}

impl ConnectionRegistry {
    pub fn new(kind: &'static str, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            kind,
            capacity,
            senders: RwLock::new(HashMap::new()),
            overflowed: RwLock::new(HashSet::new()),
        })
    }

    /// Registers a new connection and returns the receiving half of its outgoing
    /// queue; the caller's socket-writer task forwards everything it receives.
    pub async fn register(&self, id: String) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders.write().await.insert(id, tx);
        rx
    }

    pub async fn remove(&self, id: &str) {
        self.senders.write().await.remove(id);
        self.overflowed.write().await.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.senders.read().await.len()
    }

    /// Consumes and returns whether `id` was evicted for a full queue since the
    /// last call; the socket-writer task polls this after its channel closes to
    /// decide whether to send a slow-consumer close frame or a plain one.
    pub async fn take_overflow(&self, id: &str) -> bool {
        self.overflowed.write().await.remove(id)
    }

    async fn evict_for_overflow(&self, id: &str) {
        self.senders.write().await.remove(id);
        self.overflowed.write().await.insert(id.to_string());
        warn!(kind = self.kind, id, "evicting slow consumer, queue was full");
    }

    /// Sends to exactly one connection; used for EmProps's per-client job scoping.
    /// A missing queue is not an error the caller needs to act on; a full one
    /// evicts the consumer so its writer task closes the socket.
    pub async fn send_to(&self, id: &str, message: Message) {
        let full = {
            let senders = self.senders.read().await;
            match senders.get(id) {
                Some(tx) => tx.try_send(message).is_err(),
                None => false,
            }
        };
        if full {
            self.evict_for_overflow(id).await;
        }
    }

    /// Sends to every connection of this kind, in registration-iteration order.
    /// `(§4.10)`: all subscribers of the same kind see events in publish order,
    /// which holds here since `dispatch` calls this once per source event in the
    /// order it reads them off the shared pub/sub channel.
    pub async fn broadcast(&self, message: Message) {
        let overflowed: Vec<String> = {
            let senders = self.senders.read().await;
            senders
                .iter()
                .filter_map(|(id, tx)| {
                    if tx.try_send(message.clone()).is_err() {
                        Some(id.clone())
                    } else {
                        None
                    }
                })
                .collect()
        };
        for id in overflowed {
            self.evict_for_overflow(&id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_broadcast_delivers_to_receiver() {
        let registry = ConnectionRegistry::new("test", 4);
        let mut rx = registry.register("c-1".to_string()).await;

        registry.broadcast(Message::Text("hello".into())).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received, Message::Text("hello".into()));
    }

    #[tokio::test]
    async fn removed_connection_receives_nothing() {
        let registry = ConnectionRegistry::new("test", 4);
        registry.register("c-1".to_string()).await;
        registry.remove("c-1").await;
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn full_queue_does_not_panic_the_broadcaster() {
        let registry = ConnectionRegistry::new("test", 1);
        let mut rx = registry.register("c-1".to_string()).await;
        registry.broadcast(Message::Text("one".into())).await;
        registry.broadcast(Message::Text("two".into())).await; // queue full, evicted

        let first = rx.recv().await.unwrap();
        assert_eq!(first, Message::Text("one".into()));
    }

    #[tokio::test]
    async fn overflow_evicts_sender_and_reports_once() {
        let registry = ConnectionRegistry::new("test", 1);
        let mut rx = registry.register("c-1".to_string()).await;
        registry.broadcast(Message::Text("one".into())).await;
        registry.broadcast(Message::Text("two".into())).await; // queue full, evicted

        assert!(registry.take_overflow("c-1").await);
        assert!(!registry.take_overflow("c-1").await); // flag consumed, not sticky

        let _ = rx.recv().await; // drains the buffered "one"
        assert_eq!(rx.recv().await, None); // sender was dropped on eviction
        assert_eq!(registry.len().await, 0);
    }
}
