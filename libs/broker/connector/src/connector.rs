//! The connector contract (§6.2): given a job and a progress sink, produce a result
//! or error. This is the seam between the broker (which knows nothing about GPU
//! inference) and whatever actually runs the job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConnectorResult;

/// The slice of a job a connector needs; deliberately narrower than
/// `broker_model::Job` so a connector can't reach into scheduling metadata it has
/// no business touching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorJob {
    pub id: String,
    pub service_type: String,
    pub payload: Value,
    pub requirements: Option<broker_model::JobRequirements>,
}

/// One update a connector reports mid-run. Mirrors `broker_model::ProgressRecord`'s
/// fields but without the broker-assigned `worker_id`/`updated_at`, which the caller
/// (`WorkerRuntime`) fills in before handing it to `ProgressBus`.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub progress: u8,
    pub message: Option<String>,
    pub current_step: Option<u32>,
    pub total_steps: Option<u32>,
}

impl ProgressUpdate {
    pub fn new(progress: u8) -> Self {
        Self {
            progress: progress.min(100),
            message: None,
            current_step: None,
            total_steps: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Callback a connector invokes to report progress; `WorkerRuntime` supplies a
/// closure that forwards into `ProgressBus::record`. Wrapped in a named type (rather
/// than a bare `Fn` trait object) so it satisfies `Debug`, which `mockall::automock`
/// needs to render failed-expectation messages for [`Connector`].
#[derive(Clone)]
pub struct ProgressSink(std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync>);

impl ProgressSink {
    pub fn new(f: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        Self(std::sync::Arc::new(f))
    }

    pub fn report(&self, update: ProgressUpdate) {
        (self.0)(update)
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressSink(..)")
    }
}

/// A pluggable executor for one job service type (§2/§6.2). Implementations must
/// honor `cancel_job`: once called for a given `id`, any in-flight `process_job`
/// call for that id should return `Err(ConnectorError::Cancelled)` promptly.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn process_job(&self, job: ConnectorJob, progress: ProgressSink) -> ConnectorResult<Value>;
    async fn cancel_job(&self, job_id: &str) -> ConnectorResult<()>;
    async fn available_models(&self) -> ConnectorResult<Vec<String>>;
    async fn health(&self) -> bool;
}
