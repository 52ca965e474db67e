use crate::job::Job;

/// JavaScript's `Number.MAX_SAFE_INTEGER`; the scoring formula is lifted directly
/// from the source domain's convention (§4.3) and kept as an `f64` throughout since
/// sorted-set scores in the store are IEEE-754 doubles.
pub const MAX_SAFE_INT: f64 = 9_007_199_254_740_991.0;

/// Priority-then-FIFO score for the pending sorted set (§4.3).
///
/// Higher priority always dominates; within the same priority, an older `effTime`
/// yields a larger `(MAX - effTime)` term and therefore a higher score, so the
/// pending set's descending rank order serves oldest-first within a priority band.
pub fn pending_score(effective_priority: u8, effective_time_ms: i64) -> f64 {
    let priority_term = f64::from(effective_priority) * 1_000_000.0;
    let age_term = MAX_SAFE_INT - effective_time_ms as f64;
    priority_term + age_term
}

/// Convenience wrapper computing the score directly from a job's own fields.
pub fn score_for_job(job: &Job) -> f64 {
    pending_score(job.effective_priority(), job.effective_time_ms())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobSpec;

    #[test]
    fn higher_priority_always_outscores_lower_priority_regardless_of_age() {
        let old_low_priority = pending_score(10, 0);
        let new_high_priority = pending_score(90, 1_000_000_000);
        assert!(new_high_priority > old_low_priority);
    }

    #[test]
    fn equal_priority_older_job_scores_higher() {
        let older = pending_score(50, 0);
        let newer = pending_score(50, 1);
        assert!(older > newer);
    }

    #[test]
    fn workflow_steps_share_a_score_band() {
        let mut spec_a = JobSpec::new("sim", serde_json::Value::Null);
        spec_a.workflow_id = Some("wf-1".into());
        spec_a.workflow_priority = Some(50);
        spec_a.workflow_datetime = Some(1_000);
        let job_a = Job::from_spec("a", spec_a, 5_000);

        let mut spec_b = JobSpec::new("sim", serde_json::Value::Null);
        spec_b.workflow_id = Some("wf-2".into());
        spec_b.workflow_priority = Some(50);
        spec_b.workflow_datetime = Some(2_000);
        let job_b = Job::from_spec("b", spec_b, 6_000);

        // wf-1 submitted (logically) before wf-2, same nominal priority: wf-1 outranks.
        assert!(score_for_job(&job_a) > score_for_job(&job_b));
    }
}
