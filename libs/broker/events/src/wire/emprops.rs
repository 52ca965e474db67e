//! EmProps-client wire format for `/ws/client/:id` (§6.4). Semantically the same
//! events as the monitor feed, re-framed for a submitter who only cares about its
//! own jobs' lifecycle, not the whole system's.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmpropsMessage {
    ConnectionEstablished { message: String, timestamp: i64 },
    JobAccepted { job_id: String, status: String, timestamp: i64 },
    UpdateJobProgress { job_id: String, progress: u8, timestamp: i64 },
    CompleteJob { job_id: String, result: JobResult, timestamp: i64 },
}

/// Messages an EmProps client may send; currently only job submission (§6.4).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmpropsClientMessage {
    SubmitJob {
        #[serde(flatten)]
        spec: broker_model::JobSpec,
    },
}

/// Re-frames a broker-internal event for one EmProps client, if that event is one
/// this client should see at all. `owns_job` lets the caller scope delivery to jobs
/// the connected client actually submitted (§6.4 "clients are scoped").
pub fn from_broker_event(
    event: &broker_core::BrokerEvent,
    owns_job: impl Fn(&str) -> bool,
) -> Option<EmpropsMessage> {
    use broker_core::BrokerEvent as E;
    match event {
        E::JobProgress {
            job_id,
            progress,
            timestamp,
            ..
        } if owns_job(job_id) => Some(EmpropsMessage::UpdateJobProgress {
            job_id: job_id.clone(),
            progress: *progress,
            timestamp: *timestamp,
        }),
        E::JobCompleted {
            job_id,
            result,
            timestamp,
            ..
        } if owns_job(job_id) => Some(EmpropsMessage::CompleteJob {
            job_id: job_id.clone(),
            result: JobResult {
                status: JobOutcome::Success,
                data: Some(result.clone()),
                error: None,
            },
            timestamp: *timestamp,
        }),
        E::JobFailed {
            job_id,
            error,
            will_retry,
            timestamp,
            ..
        } if !will_retry && owns_job(job_id) => Some(EmpropsMessage::CompleteJob {
            job_id: job_id.clone(),
            result: JobResult {
                status: JobOutcome::Failed,
                data: None,
                error: Some(error.clone()),
            },
            timestamp: *timestamp,
        }),
        _ => None,
    }
}
