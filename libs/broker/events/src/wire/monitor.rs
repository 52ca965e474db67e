//! Native wire format for `/ws/monitor/:id` (§6.3). One JSON object per line; the
//! `type` tag is exactly what the teacher's own wire types look like today.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobCounts {
    pub pending: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerCounts {
    pub total: u64,
    pub idle: u64,
    pub busy: u64,
    pub offline: u64,
}

/// One worker's current assignment, for the stats ticker's per-worker breakdown
/// (§6.3's "per-worker current-job" field).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub worker_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job_id: Option<String>,
}

/// Recent job ids per bucket, capped so a busy broker doesn't make every tick's
/// payload grow without bound (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecentJobs {
    pub pending: Vec<String>,
    pub active: Vec<String>,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub queues: JobCounts,
    pub jobs: JobCounts,
    pub workers: WorkerCounts,
    pub worker_details: Vec<WorkerSnapshot>,
    pub recent: RecentJobs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorMessage {
    StatsBroadcast {
        timestamp: i64,
        connections: u32,
        workers: u32,
        subscriptions: u32,
        system: SystemSnapshot,
    },
    JobStatusChanged {
        job_id: String,
        old_status: String,
        new_status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        worker_id: Option<String>,
        timestamp: i64,
    },
    WorkerStatusChanged {
        worker_id: String,
        old_status: String,
        new_status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_job_id: Option<String>,
        timestamp: i64,
    },
    JobProgress {
        job_id: String,
        worker_id: String,
        progress: u8,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: i64,
    },
}

/// Re-frames a broker-internal event into the native monitor wire format. Returns
/// `None` for events monitors are not meant to see (currently: none, but keeps the
/// conversion total and explicit rather than a catch-all panic).
pub fn from_broker_event(event: &broker_core::BrokerEvent) -> Option<MonitorMessage> {
    use broker_core::BrokerEvent as E;
    Some(match event.clone() {
        E::JobSubmitted { .. } => return no_monitor_analogue(),
        E::JobAssigned {
            job_id,
            worker_id,
            timestamp,
        } => MonitorMessage::JobStatusChanged {
            job_id,
            old_status: "pending".to_string(),
            new_status: "assigned".to_string(),
            worker_id: Some(worker_id),
            timestamp,
        },
        E::JobProgress {
            job_id,
            worker_id,
            progress,
            status,
            message,
            timestamp,
        } => MonitorMessage::JobProgress {
            job_id,
            worker_id,
            progress,
            status,
            message,
            timestamp,
        },
        E::JobCompleted {
            job_id,
            worker_id,
            timestamp,
            ..
        } => MonitorMessage::JobStatusChanged {
            job_id,
            old_status: "in_progress".to_string(),
            new_status: "completed".to_string(),
            worker_id: Some(worker_id),
            timestamp,
        },
        E::JobFailed {
            job_id,
            worker_id,
            will_retry,
            timestamp,
            ..
        } => MonitorMessage::JobStatusChanged {
            job_id,
            old_status: "in_progress".to_string(),
            new_status: if will_retry { "pending".to_string() } else { "failed".to_string() },
            worker_id,
            timestamp,
        },
        E::JobCancelled { job_id, timestamp, .. } => MonitorMessage::JobStatusChanged {
            job_id,
            old_status: "active".to_string(),
            new_status: "cancelled".to_string(),
            worker_id: None,
            timestamp,
        },
        E::WorkerStatus {
            worker_id,
            old_status,
            new_status,
            current_job_id,
            timestamp,
        } => MonitorMessage::WorkerStatusChanged {
            worker_id,
            old_status,
            new_status,
            current_job_id,
            timestamp,
        },
        E::WorkerRegistered { worker_id, timestamp, .. } => MonitorMessage::WorkerStatusChanged {
            worker_id,
            old_status: "unknown".to_string(),
            new_status: "initializing".to_string(),
            current_job_id: None,
            timestamp,
        },
        E::WorkerDisconnected { worker_id, timestamp } => MonitorMessage::WorkerStatusChanged {
            worker_id,
            old_status: "idle".to_string(),
            new_status: "offline".to_string(),
            current_job_id: None,
            timestamp,
        },
    })
}

/// `job_submitted` has no natural `job_status_changed` analogue (there is no "old"
/// status) — monitors learn about new jobs through the next `StatsBroadcast` tick
/// instead (§4.11), so the per-event conversion is intentionally a no-op here.
fn no_monitor_analogue() -> Option<MonitorMessage> {
    None
}
