use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

/// Opaque payload blob traversed only by the connector that ends up running the job.
pub type JobPayload = serde_json::Value;

/// Hardware/model/component predicates a job may require of the claiming worker.
///
/// Any field left unset imposes no constraint. A value of `"all"` in a worker's
/// matching declaration (see `broker_model::worker::Capabilities`) always satisfies
/// the corresponding requirement regardless of what the job asks for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobRequirements {
    pub service_type: Option<String>,
    pub component: Option<String>,
    pub workflow: Option<String>,
    pub models: Option<HashSet<String>>,
    pub gpu_memory_gb: Option<f64>,
    pub ram_gb: Option<f64>,
    pub cpu_cores: Option<u32>,
}

/// Terminal and non-terminal job states (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// What a caller submits to create a job (§6.1 `SubmitJob`).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JobSpec {
    #[validate(length(min = 1, message = "service_required must not be empty"))]
    pub service_required: String,
    #[validate(range(min = 0, max = 100, message = "priority must be within 0..=100"))]
    pub priority: u8,
    pub payload: JobPayload,
    pub requirements: Option<JobRequirements>,
    pub customer_id: Option<String>,
    pub max_retries: Option<u32>,
    pub workflow_id: Option<String>,
    pub workflow_priority: Option<u8>,
    pub workflow_datetime: Option<i64>,
    pub step_number: Option<u32>,
    pub total_steps: Option<u32>,
}

impl JobSpec {
    /// A bare job with no workflow grouping and the default priority (§6.6).
    pub fn new(service_required: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            service_required: service_required.into(),
            priority: 50,
            payload,
            requirements: None,
            customer_id: None,
            max_retries: None,
            workflow_id: None,
            workflow_priority: None,
            workflow_datetime: None,
            step_number: None,
            total_steps: None,
        }
    }
}

/// A unit of work, as persisted under `job:<id>` (§6.5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub service_required: String,
    pub priority: u8,
    pub payload: JobPayload,
    #[serde(default)]
    pub requirements: Option<JobRequirements>,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub status: JobStatus,

    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub workflow_priority: Option<u8>,
    #[serde(default)]
    pub workflow_datetime: Option<i64>,
    #[serde(default)]
    pub step_number: Option<u32>,
    #[serde(default)]
    pub total_steps: Option<u32>,

    pub created_at: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub last_failed_worker: Option<String>,

    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub assigned_at: Option<i64>,
    #[serde(default)]
    pub started_at: Option<i64>,

    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub failed_at: Option<i64>,
    #[serde(default)]
    pub cancelled_at: Option<i64>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Job {
    /// Build a fresh, pending job from a validated spec. `now_ms` is supplied by the
    /// caller (typically `chrono::Utc::now().timestamp_millis()`) so construction stays
    /// deterministic and testable.
    pub fn from_spec(id: impl Into<String>, spec: JobSpec, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            service_required: spec.service_required,
            priority: spec.priority,
            payload: spec.payload,
            requirements: spec.requirements,
            customer_id: spec.customer_id,
            status: JobStatus::Pending,
            workflow_id: spec.workflow_id,
            workflow_priority: spec.workflow_priority,
            workflow_datetime: spec.workflow_datetime,
            step_number: spec.step_number,
            total_steps: spec.total_steps,
            created_at: now_ms,
            retry_count: 0,
            max_retries: spec.max_retries.unwrap_or(3),
            last_failed_worker: None,
            worker_id: None,
            assigned_at: None,
            started_at: None,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            last_error: None,
        }
    }

    /// Effective priority used by the scheduler: a workflow's shared priority wins
    /// over the job's own, so steps of one workflow sort together (§4.3).
    pub fn effective_priority(&self) -> u8 {
        self.workflow_priority.unwrap_or(self.priority)
    }

    /// Effective submission time used by the scheduler, same override rule as priority.
    pub fn effective_time_ms(&self) -> i64 {
        self.workflow_datetime.unwrap_or(self.created_at)
    }

    pub fn is_active_on(&self, worker_id: &str) -> bool {
        matches!(self.status, JobStatus::Assigned | JobStatus::InProgress)
            && self.worker_id.as_deref() == Some(worker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_spec_defaults_max_retries_and_status() {
        let spec = JobSpec::new("sim", serde_json::json!({"prompt": "a cat"}));
        let job = Job::from_spec("job-1", spec, 1_000);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.retry_count, 0);
        assert!(job.worker_id.is_none());
    }

    #[test]
    fn effective_priority_prefers_workflow_priority() {
        let mut spec = JobSpec::new("sim", serde_json::Value::Null);
        spec.priority = 10;
        spec.workflow_priority = Some(90);
        let job = Job::from_spec("job-1", spec, 0);
        assert_eq!(job.effective_priority(), 90);
    }

    #[test]
    fn effective_time_prefers_workflow_datetime() {
        let mut spec = JobSpec::new("sim", serde_json::Value::Null);
        spec.workflow_datetime = Some(500);
        let job = Job::from_spec("job-1", spec, 1_000);
        assert_eq!(job.effective_time_ms(), 500);
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
    }
}
