//! Errors a [`crate::Connector`] surfaces to its caller (§7: `ConnectorError`).

use broker_resilience::WorkerError;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("connector {connector} rejected job {job_id}: {message}")]
    Rejected {
        connector: String,
        job_id: String,
        message: String,
        retryable: bool,
    },

    #[error("connector call cancelled")]
    Cancelled,

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl ConnectorError {
    /// Whether `JobRepository::Fail` should retry this job (§7's `ConnectorError`
    /// row: "fail with its retryable flag, default retry").
    pub fn retryable(&self) -> bool {
        match self {
            Self::Rejected { retryable, .. } => *retryable,
            Self::Cancelled => false,
            Self::Worker(e) => !matches!(e.category(), broker_resilience::ErrorCategory::Permanent),
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
