//! The pull-side claim protocol (§4.4): a worker asks, the broker picks the
//! highest-scored eligible candidate and resolves contention with one atomic
//! conditional remove per attempt.

use std::sync::Arc;

use broker_model::{is_eligible, Job, Worker};
use broker_store::Store;
use tracing::{debug, instrument};

use crate::config::BrokerConfig;
use crate::error::BrokerResult;
use crate::job_repository::JobRepository;
use crate::keys;
use crate::worker_registry::WorkerRegistry;

#[derive(Clone)]
pub struct Broker {
    store: Arc<dyn Store>,
    job_repository: JobRepository,
    worker_registry: WorkerRegistry,
    config: BrokerConfig,
}

impl Broker {
    pub fn new(store: Arc<dyn Store>, config: BrokerConfig) -> Self {
        Self {
            job_repository: JobRepository::new(store.clone()),
            worker_registry: WorkerRegistry::new(store.clone()),
            store,
            config,
        }
    }

    /// Attempts to claim one job on `worker`'s behalf.
    ///
    /// Reads the top `claim_candidates` entries off `jobs:pending` in score order,
    /// skips any the worker is ineligible for, and tries a `ZREM`-backed conditional
    /// remove on the first eligible one. A losing remove (another worker already
    /// took it) falls through to the next candidate rather than failing the whole
    /// attempt — contention is expected under load, not exceptional (§4.4, §9).
    #[instrument(skip(self, worker), fields(worker_id = %worker.id))]
    pub async fn claim(&self, worker: &Worker, now_ms: i64) -> BrokerResult<Option<Job>> {
        let candidates = self
            .store
            .zset_range_desc(keys::JOBS_PENDING, 0, self.config.claim_candidates as isize - 1)
            .await?;

        for (job_id, _score) in candidates {
            let Some(job) = self.job_repository.get(&job_id).await? else {
                // Stale pending entry (e.g. cancelled between read and claim); drop it.
                let _ = self.store.zset_remove(keys::JOBS_PENDING, &job_id).await;
                continue;
            };

            if !is_eligible(&job, worker, self.config.strict_matching) {
                continue;
            }

            let won = self
                .store
                .zset_conditional_remove(keys::JOBS_PENDING, &job_id)
                .await?;
            if !won {
                debug!(job_id = %job_id, "lost claim race, trying next candidate");
                continue;
            }

            let job = self
                .job_repository
                .mark_assigned(&job_id, &worker.id, now_ms)
                .await?;
            self.worker_registry
                .assign_job(&worker.id, &job_id, now_ms)
                .await?;
            return Ok(Some(job));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_model::Capabilities;
    use broker_store::MockStore;
    use mockall::predicate::*;

    fn worker() -> Worker {
        Worker::new("w-1", "host-a", Capabilities::default(), 0)
    }

    #[tokio::test]
    async fn claim_returns_none_when_pending_is_empty() {
        let mut store = MockStore::new();
        store
            .expect_zset_range_desc()
            .with(eq("jobs:pending"), eq(0), eq(0))
            .returning(|_, _, _| Ok(vec![]));

        let broker = Broker::new(Arc::new(store), BrokerConfig::default());
        assert!(broker.claim(&worker(), 1_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_returns_none_when_the_only_candidate_loses_the_race() {
        use broker_model::JobSpec;

        let mut store = MockStore::new();
        store
            .expect_zset_range_desc()
            .with(eq("jobs:pending"), eq(0), eq(0))
            .returning(|_, _, _| Ok(vec![("job-a".to_string(), 100.0)]));

        let job_a = Job::from_spec("job-a", JobSpec::new("sim", serde_json::Value::Null), 0);
        let hash_a = crate::serialize::to_hash(&job_a).unwrap();
        store
            .expect_hash_get_all()
            .with(eq("job:job-a"))
            .returning(move |_| Ok(hash_a.clone()));

        // Another worker wins the race first.
        store
            .expect_zset_conditional_remove()
            .with(eq("jobs:pending"), eq("job-a"))
            .returning(|_, _| Ok(false));

        let broker = Broker::new(Arc::new(store), BrokerConfig::default());
        let result = broker.claim(&worker(), 1_000).await.unwrap();
        assert!(result.is_none());
    }
}
