use crate::job::Job;
use crate::worker::{CustomerIsolation, Worker};

/// Evaluates §4.5's capability predicates. `strict` toggles whether the filter runs
/// at all: when `false` (Phase-1A / permissive mode), every worker is eligible for
/// every pending job regardless of declared capabilities.
pub fn is_eligible(job: &Job, worker: &Worker, strict: bool) -> bool {
    if job.last_failed_worker.as_deref() == Some(worker.id.as_str()) {
        return false;
    }

    if !strict {
        return true;
    }

    let caps = &worker.capabilities;

    if !caps.services.contains(&job.service_required) {
        return false;
    }

    if let Some(requirements) = &job.requirements {
        if let Some(service_type) = &requirements.service_type {
            if !caps.services.contains(service_type) {
                return false;
            }
        }
        if let Some(component) = &requirements.component {
            if !caps.components.matches(component) {
                return false;
            }
        }
        if let Some(workflow) = &requirements.workflow {
            if !caps.workflows.matches(workflow) {
                return false;
            }
        }
        if let Some(models) = &requirements.models {
            if !models.iter().all(|m| caps.models.matches(m)) {
                return false;
            }
        }
        if let Some(min) = requirements.gpu_memory_gb {
            if caps.gpu_memory_gb.unwrap_or(0.0) < min {
                return false;
            }
        }
        if let Some(min) = requirements.ram_gb {
            if caps.ram_gb.unwrap_or(0.0) < min {
                return false;
            }
        }
        if let Some(min) = requirements.cpu_cores {
            if caps.cpu_cores.unwrap_or(0) < min {
                return false;
            }
        }
    }

    if let Some(customer_id) = &job.customer_id {
        if caps.denied_customers.contains(customer_id) {
            return false;
        }
        if caps.customer_isolation == CustomerIsolation::Strict {
            if let Some(allowed) = &caps.allowed_customers {
                if !allowed.contains(customer_id) {
                    return false;
                }
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRequirements, JobSpec};
    use crate::worker::{Capabilities, MatchSet};
    use std::collections::HashSet;

    fn worker_with(services: &[&str]) -> Worker {
        let mut caps = Capabilities::default();
        caps.services = services.iter().map(|s| s.to_string()).collect();
        Worker::new("w-1", "host-a", caps, 0)
    }

    #[test]
    fn permissive_mode_ignores_capabilities_but_still_blocks_self_retry() {
        let mut job = Job::from_spec("j-1", JobSpec::new("comfyui", serde_json::Value::Null), 0);
        job.last_failed_worker = Some("w-1".into());
        let worker = worker_with(&["sim"]);
        assert!(!is_eligible(&job, &worker, false));

        job.last_failed_worker = None;
        assert!(is_eligible(&job, &worker, false));
    }

    #[test]
    fn strict_mode_requires_matching_service() {
        let job = Job::from_spec("j-1", JobSpec::new("comfyui", serde_json::Value::Null), 0);
        let worker = worker_with(&["sim"]);
        assert!(!is_eligible(&job, &worker, true));

        let worker = worker_with(&["comfyui"]);
        assert!(is_eligible(&job, &worker, true));
    }

    #[test]
    fn strict_mode_checks_hardware_minimums() {
        let mut spec = JobSpec::new("sim", serde_json::Value::Null);
        spec.requirements = Some(JobRequirements {
            gpu_memory_gb: Some(24.0),
            ..Default::default()
        });
        let job = Job::from_spec("j-1", spec, 0);

        let mut worker = worker_with(&["sim"]);
        worker.capabilities.gpu_memory_gb = Some(12.0);
        assert!(!is_eligible(&job, &worker, true));

        worker.capabilities.gpu_memory_gb = Some(24.0);
        assert!(is_eligible(&job, &worker, true));
    }

    #[test]
    fn strict_mode_honors_model_set_membership() {
        let mut spec = JobSpec::new("sim", serde_json::Value::Null);
        spec.requirements = Some(JobRequirements {
            models: Some(HashSet::from(["sdxl".to_string()])),
            ..Default::default()
        });
        let job = Job::from_spec("j-1", spec, 0);

        let mut worker = worker_with(&["sim"]);
        worker.capabilities.models = MatchSet::Only(HashSet::from(["flux".to_string()]));
        assert!(!is_eligible(&job, &worker, true));

        worker.capabilities.models = MatchSet::Only(HashSet::from(["sdxl".to_string()]));
        assert!(is_eligible(&job, &worker, true));
    }

    #[test]
    fn denied_customers_always_excludes_even_when_permissive_isolation() {
        let mut spec = JobSpec::new("sim", serde_json::Value::Null);
        spec.customer_id = Some("cust-1".into());
        let job = Job::from_spec("j-1", spec, 0);

        let mut worker = worker_with(&["sim"]);
        worker.capabilities.denied_customers.insert("cust-1".into());
        assert!(!is_eligible(&job, &worker, true));
    }

    #[test]
    fn strict_isolation_requires_allow_listing() {
        let mut spec = JobSpec::new("sim", serde_json::Value::Null);
        spec.customer_id = Some("cust-2".into());
        let job = Job::from_spec("j-1", spec, 0);

        let mut worker = worker_with(&["sim"]);
        worker.capabilities.customer_isolation = CustomerIsolation::Strict;
        worker.capabilities.allowed_customers = Some(HashSet::from(["cust-1".to_string()]));
        assert!(!is_eligible(&job, &worker, true));

        worker.capabilities.allowed_customers = Some(HashSet::from(["cust-2".to_string()]));
        assert!(is_eligible(&job, &worker, true));
    }
}
