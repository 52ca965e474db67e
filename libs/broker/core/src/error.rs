use broker_resilience::{ErrorCategory, WorkerError};
use broker_store::StoreError;

/// Error kinds from §7, merged with the store/resilience error hierarchy so a single
/// `?` chain carries a job from a store failure all the way to a `Fail` call.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Conditional remove returned false during claim; silent, try next candidate.
    #[error("contention on job {job_id}")]
    Contention { job_id: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("capability mismatch: {0}")]
    CapabilityMismatch(String),

    #[error("connector error: {message} (retryable={retryable})")]
    Connector { message: String, retryable: bool },

    #[error("job already terminal: {0}")]
    AlreadyTerminal(String),

    #[error("invalid job spec: {0}")]
    Invalid(String),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl From<validator::ValidationErrors> for BrokerError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Invalid(err.to_string())
    }
}

impl From<StoreError> for BrokerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl BrokerError {
    /// Whether the operation that produced this error should be retried by the
    /// caller (JobRepository's `Fail` path, §4.6).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) | Self::Timeout(_) | Self::CapabilityMismatch(_) => true,
            Self::Connector { retryable, .. } => *retryable,
            Self::Worker(e) => matches!(
                e.category(),
                ErrorCategory::Transient | ErrorCategory::RateLimited
            ),
            Self::Contention { .. } | Self::NotFound(_) | Self::AlreadyTerminal(_) | Self::Invalid(_) => {
                false
            }
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
