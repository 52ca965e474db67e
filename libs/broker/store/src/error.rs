/// Errors surfaced by the `Store` trait (§4.1, §7).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport to the backing store is down. Callers retry with backoff or degrade.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store operation failed: {0}")]
    Operation(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_io_error() || err.is_connection_refusal() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Operation(err.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
