//! Persisted state layout (§6.5) as a small set of key-building helpers, kept in one
//! place so nothing else in this crate hand-formats a key string.

pub const JOBS_PENDING: &str = "jobs:pending";
pub const JOBS_COMPLETED: &str = "jobs:completed";
pub const JOBS_FAILED: &str = "jobs:failed";
pub const WORKERS_ACTIVE: &str = "workers:active";

pub fn job(job_id: &str) -> String {
    format!("job:{job_id}")
}

pub fn job_progress_snapshot(job_id: &str) -> String {
    format!("job:{job_id}:progress")
}

pub fn jobs_active(worker_id: &str) -> String {
    format!("jobs:active:{worker_id}")
}

pub fn jobs_active_pattern() -> &'static str {
    "jobs:active:*"
}

pub fn worker(worker_id: &str) -> String {
    format!("worker:{worker_id}")
}

pub fn worker_heartbeat(worker_id: &str) -> String {
    format!("worker:{worker_id}:heartbeat")
}

pub fn progress_stream(job_id: &str) -> String {
    format!("progress:{job_id}")
}

/// Extracts `<w>` from a `jobs:active:<w>` key, as produced by `Store::keys` matched
/// against [`jobs_active_pattern`].
pub fn worker_id_from_active_key(key: &str) -> Option<&str> {
    key.strip_prefix("jobs:active:")
}

/// Pub/sub channel names (§4.10).
pub mod channels {
    pub const JOB_SUBMITTED: &str = "job_submitted";
    pub const JOB_ASSIGNED: &str = "job_assigned";
    pub const JOB_PROGRESS: &str = "job_progress";
    pub const JOB_COMPLETED: &str = "job_completed";
    pub const JOB_FAILED: &str = "job_failed";
    pub const JOB_CANCELLED: &str = "job_cancelled";
    pub const WORKER_STATUS: &str = "worker_status";
    pub const WORKER_REGISTERED: &str = "worker_registered";
    pub const WORKER_DISCONNECTED: &str = "worker_disconnected";

    pub const ALL: &[&str] = &[
        JOB_SUBMITTED,
        JOB_ASSIGNED,
        JOB_PROGRESS,
        JOB_COMPLETED,
        JOB_FAILED,
        JOB_CANCELLED,
        WORKER_STATUS,
        WORKER_REGISTERED,
        WORKER_DISCONNECTED,
    ];
}
