//! Event envelopes published on the channels named in [`crate::keys::channels`].
//!
//! `EventBroadcaster` (in `broker-events`) subscribes to these same channels and
//! re-frames each payload into the wire format its consumer expects (§4.10); this
//! crate only needs to agree on a serialization, not on who reads it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use broker_store::Store;

use crate::error::BrokerResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerEvent {
    JobSubmitted {
        job_id: String,
        service_required: String,
        priority: u8,
        timestamp: i64,
    },
    JobAssigned {
        job_id: String,
        worker_id: String,
        timestamp: i64,
    },
    JobProgress {
        job_id: String,
        worker_id: String,
        progress: u8,
        status: String,
        message: Option<String>,
        timestamp: i64,
    },
    JobCompleted {
        job_id: String,
        worker_id: String,
        result: Value,
        timestamp: i64,
    },
    JobFailed {
        job_id: String,
        worker_id: Option<String>,
        error: String,
        will_retry: bool,
        retry_count: u32,
        timestamp: i64,
    },
    JobCancelled {
        job_id: String,
        reason: String,
        timestamp: i64,
    },
    WorkerStatus {
        worker_id: String,
        old_status: String,
        new_status: String,
        current_job_id: Option<String>,
        timestamp: i64,
    },
    WorkerRegistered {
        worker_id: String,
        machine_id: String,
        timestamp: i64,
    },
    WorkerDisconnected {
        worker_id: String,
        timestamp: i64,
    },
}

impl BrokerEvent {
    pub fn channel(&self) -> &'static str {
        use crate::keys::channels::*;
        match self {
            Self::JobSubmitted { .. } => JOB_SUBMITTED,
            Self::JobAssigned { .. } => JOB_ASSIGNED,
            Self::JobProgress { .. } => JOB_PROGRESS,
            Self::JobCompleted { .. } => JOB_COMPLETED,
            Self::JobFailed { .. } => JOB_FAILED,
            Self::JobCancelled { .. } => JOB_CANCELLED,
            Self::WorkerStatus { .. } => WORKER_STATUS,
            Self::WorkerRegistered { .. } => WORKER_REGISTERED,
            Self::WorkerDisconnected { .. } => WORKER_DISCONNECTED,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Publishes `event` on its channel. Failures are logged, not propagated: a missed
/// pub/sub notification never invalidates the store write that preceded it (§5).
pub async fn publish(store: &dyn Store, event: &BrokerEvent) -> BrokerResult<()> {
    store.publish(event.channel(), &event.to_json()).await?;
    Ok(())
}
