use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// `"all"` sentinel a worker can declare for a component/model/workflow set, meaning
/// it matches any value a job requests for that predicate (§4.5).
pub const MATCH_ALL: &str = "all";

/// Declares what a worker can run and who may use it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capabilities {
    pub services: HashSet<String>,
    pub components: MatchSet,
    pub workflows: MatchSet,
    pub models: MatchSet,
    pub gpu_memory_gb: Option<f64>,
    pub ram_gb: Option<f64>,
    pub cpu_cores: Option<u32>,
    pub max_concurrent: u32,
    pub customer_isolation: CustomerIsolation,
    pub allowed_customers: Option<HashSet<String>>,
    pub denied_customers: HashSet<String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            services: HashSet::new(),
            components: MatchSet::All,
            workflows: MatchSet::All,
            models: MatchSet::All,
            gpu_memory_gb: None,
            ram_gb: None,
            cpu_cores: None,
            max_concurrent: 1,
            customer_isolation: CustomerIsolation::Open,
            allowed_customers: None,
            denied_customers: HashSet::new(),
        }
    }
}

/// A worker's declared set for a single matching dimension (component/workflow/model):
/// either it claims to support everything, or an explicit set of values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MatchSet {
    All,
    Only(HashSet<String>),
}

impl MatchSet {
    pub fn matches(&self, requested: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(requested),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerIsolation {
    /// No restriction beyond `denied_customers`.
    Open,
    /// `allowed_customers`, when set, is an allow-list.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Initializing,
    Idle,
    Busy,
    Offline,
}

/// A job-processing agent, as persisted under `worker:<id>` (§6.5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub id: String,
    /// Groups workers running on the same physical/virtual machine; metadata only,
    /// does not affect scheduling (§9).
    pub machine_id: String,
    pub capabilities: Capabilities,
    pub status: WorkerStatus,
    pub connected_at: i64,
    pub last_heartbeat: i64,
    #[serde(default)]
    pub current_job_id: Option<String>,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
}

impl Worker {
    pub fn new(id: impl Into<String>, machine_id: impl Into<String>, capabilities: Capabilities, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            machine_id: machine_id.into(),
            capabilities,
            status: WorkerStatus::Initializing,
            connected_at: now_ms,
            last_heartbeat: now_ms,
            current_job_id: None,
            jobs_processed: 0,
            jobs_failed: 0,
        }
    }

    pub fn is_idle_and_available(&self) -> bool {
        matches!(self.status, WorkerStatus::Idle) && self.current_job_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_set_all_matches_everything() {
        assert!(MatchSet::All.matches("anything"));
    }

    #[test]
    fn match_set_only_matches_declared_values() {
        let set = MatchSet::Only(["sdxl".to_string()].into_iter().collect());
        assert!(set.matches("sdxl"));
        assert!(!set.matches("flux"));
    }

    #[test]
    fn default_capabilities_are_permissive_on_matching_but_have_no_services() {
        let caps = Capabilities::default();
        assert!(caps.services.is_empty());
        assert_eq!(caps.components, MatchSet::All);
        assert_eq!(caps.max_concurrent, 1);
    }

    #[test]
    fn new_worker_starts_initializing_with_no_job() {
        let worker = Worker::new("w-1", "host-a", Capabilities::default(), 1_000);
        assert_eq!(worker.status, WorkerStatus::Initializing);
        assert!(worker.current_job_id.is_none());
        assert!(!worker.is_idle_and_available());
    }
}
