#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    #[error(transparent)]
    Store(#[from] broker_store::StoreError),

    #[error(transparent)]
    Broker(#[from] broker_core::BrokerError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown connection id: {0}")]
    UnknownConnection(String),
}

pub type EventsResult<T> = Result<T, EventsError>;
