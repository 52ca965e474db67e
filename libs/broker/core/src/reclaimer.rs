//! Janitor over orphaned active jobs, stuck workers, dead workers, stalled jobs,
//! and orphaned queue entries (§4.7). Runs on a fixed interval; each sweep is
//! independent and a failure in one does not block the others.
//!
//! - Sweep A (`sweep_orphaned_active`): a `jobs:active:<workerId>` entry whose
//!   worker has fallen out of `workers:active` entirely (deregistered, evicted,
//!   or never finished registering) is reset straight back to `Pending` — the
//!   worker is gone, not just unresponsive, so there is nothing to retry against.
//! - Sweep B (`sweep_stuck_workers`): a worker still in `workers:active` whose
//!   `current_job_id` points at a job that is already terminal (or gone) is
//!   cleared back to idle so it can be handed new work.
//! - Sweep C (`sweep_heartbeat_timeouts` + `sweep_progress_timeouts`): a worker
//!   whose heartbeat TTL lapsed, or whose claimed job's progress snapshot has
//!   gone stale, is treated as crashed/hung and its job failed through the normal
//!   retry budget.

use std::sync::Arc;

use broker_store::Store;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::config::ReclaimerConfig;
use crate::error::BrokerResult;
use crate::job_repository::JobRepository;
use crate::keys;
use crate::progress_bus::ProgressBus;
use crate::worker_registry::WorkerRegistry;

/// How many jobs/workers each sweep acted on, for logging and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub orphaned_active_reset: u32,
    pub stuck_workers_cleared: u32,
    pub heartbeat_timeouts_reclaimed: u32,
    pub stalled_jobs_reclaimed: u32,
    pub orphaned_pending_removed: u32,
}

pub struct Reclaimer {
    store: Arc<dyn Store>,
    job_repository: JobRepository,
    worker_registry: WorkerRegistry,
    progress_bus: ProgressBus,
    config: ReclaimerConfig,
}

impl Reclaimer {
    pub fn new(store: Arc<dyn Store>, config: ReclaimerConfig) -> Self {
        Self {
            job_repository: JobRepository::new(store.clone()),
            worker_registry: WorkerRegistry::new(store.clone()),
            progress_bus: ProgressBus::new(store.clone()),
            store,
            config,
        }
    }

    /// Runs every sweep once. Intended to be called on a timer by [`Self::run`],
    /// but exposed directly so tests and an operator-triggered "reclaim now" control
    /// action can invoke it without waiting for the interval.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now_ms: i64) -> BrokerResult<SweepReport> {
        let mut report = SweepReport::default();
        report.orphaned_active_reset = self.sweep_orphaned_active().await?;
        report.stuck_workers_cleared = self.sweep_stuck_workers(now_ms).await?;
        report.heartbeat_timeouts_reclaimed = self.sweep_heartbeat_timeouts(now_ms).await?;
        report.stalled_jobs_reclaimed = self.sweep_progress_timeouts(now_ms).await?;
        report.orphaned_pending_removed = self.sweep_orphaned_pending().await?;
        Ok(report)
    }

    /// Sweep A: a `jobs:active:<workerId>` entry whose worker is no longer a
    /// member of `workers:active` at all (not merely unresponsive) is reset back
    /// to `Pending` with no retry bookkeeping — the worker that would have been
    /// charged for the retry is gone — and the stale active-job map is dropped.
    async fn sweep_orphaned_active(&self) -> BrokerResult<u32> {
        let active_keys = self.store.keys(keys::jobs_active_pattern()).await?;
        let mut reset = 0;

        for key in active_keys {
            let Some(worker_id) = keys::worker_id_from_active_key(&key) else {
                continue;
            };
            if self.worker_registry.is_active_member(worker_id).await? {
                continue;
            }

            warn!(worker_id, "resetting orphaned active jobs for worker absent from active set");
            let fields = self.store.hash_get_all(&key).await?;
            for (job_id, json) in fields {
                let Ok(job) = serde_json::from_str::<broker_model::Job>(&json) else {
                    continue;
                };
                if !job.status.is_terminal() {
                    self.job_repository.reset_to_pending(&job_id).await?;
                    reset += 1;
                }
            }
            self.store.hash_del_key(&key).await?;
        }

        Ok(reset)
    }

    /// Sweep B: a worker still in `workers:active` whose `current_job_id` names a
    /// job that has already reached a terminal state (or no longer exists) is
    /// cleared back to idle, so a worker that missed its own completion
    /// acknowledgement does not sit forever looking busy.
    async fn sweep_stuck_workers(&self, now_ms: i64) -> BrokerResult<u32> {
        let workers = self.worker_registry.list_active().await?;
        let mut cleared = 0;

        for worker in workers {
            let Some(job_id) = &worker.current_job_id else {
                continue;
            };
            let stuck = match self.job_repository.get(job_id).await? {
                Some(job) => job.status.is_terminal(),
                None => true,
            };
            if stuck {
                warn!(worker_id = %worker.id, job_id, "clearing stuck current_job_id");
                self.worker_registry.clear_current_job(&worker.id, now_ms).await?;
                cleared += 1;
            }
        }

        Ok(cleared)
    }

    /// Sweep C (heartbeat half): a worker still listed in `workers:active` whose
    /// heartbeat TTL has expired is presumed crashed. Its in-flight jobs are
    /// failed (retried or archived per §4.6) and it is evicted from the active set.
    async fn sweep_heartbeat_timeouts(&self, now_ms: i64) -> BrokerResult<u32> {
        let active_keys = self.store.keys(keys::jobs_active_pattern()).await?;
        let mut reclaimed = 0;

        for key in active_keys {
            let Some(worker_id) = keys::worker_id_from_active_key(&key) else {
                continue;
            };
            if !self.worker_registry.is_active_member(worker_id).await? {
                continue; // handled by sweep A
            }
            if self.worker_registry.is_alive(worker_id).await? {
                continue;
            }

            warn!(worker_id, "reclaiming dead worker's active jobs");
            let fields = self.store.hash_get_all(&key).await?;
            for (job_id, json) in fields {
                let Ok(job) = serde_json::from_str::<broker_model::Job>(&json) else {
                    continue;
                };
                if !job.status.is_terminal() {
                    self.job_repository
                        .fail(&job_id, worker_id, "worker heartbeat expired", true, now_ms)
                        .await?;
                    reclaimed += 1;
                }
            }
            self.worker_registry.mark_offline(worker_id, now_ms).await?;
        }

        Ok(reclaimed)
    }

    /// Sweep C (progress half): a job whose progress snapshot has not moved within
    /// `progress_timeout_s`, even though its worker is still alive, is presumed
    /// stuck (hung connector call) and failed the same way a crash would be.
    async fn sweep_progress_timeouts(&self, now_ms: i64) -> BrokerResult<u32> {
        let active_keys = self.store.keys(keys::jobs_active_pattern()).await?;
        let timeout_ms = self.config.progress_timeout_s as i64 * 1_000;
        let mut reclaimed = 0;

        for key in active_keys {
            let Some(worker_id) = keys::worker_id_from_active_key(&key) else {
                continue;
            };
            if !self.worker_registry.is_alive(worker_id).await? {
                continue; // handled by the heartbeat sweep
            }

            let fields = self.store.hash_get_all(&key).await?;
            for (job_id, json) in fields {
                let Ok(job) = serde_json::from_str::<broker_model::Job>(&json) else {
                    continue;
                };
                if job.status.is_terminal() {
                    continue;
                }

                let last_update = self
                    .progress_bus
                    .snapshot(&job.id)
                    .await?
                    .map(|record| record.updated_at)
                    .unwrap_or(job.assigned_at.unwrap_or(job.created_at));

                if now_ms - last_update > timeout_ms {
                    warn!(job_id, worker_id, "reclaiming stalled job");
                    self.job_repository
                        .fail(&job_id, worker_id, "progress timeout", true, now_ms)
                        .await?;
                    reclaimed += 1;
                }
            }
        }

        Ok(reclaimed)
    }

    /// A `jobs:pending` member with no corresponding `job:<id>` hash (e.g. a crash
    /// between `ZADD` and `HSET` during submit, vanishingly rare but not
    /// impossible) is removed so it stops being handed out as a claim candidate.
    async fn sweep_orphaned_pending(&self) -> BrokerResult<u32> {
        let pending = self.store.zset_range_desc(keys::JOBS_PENDING, 0, -1).await?;
        let mut removed = 0;

        for (job_id, _score) in pending {
            if self.job_repository.get(&job_id).await?.is_none() {
                self.store.zset_remove(keys::JOBS_PENDING, &job_id).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Periodic loop driven by `shutdown`; exits as soon as the channel reports
    /// `true`, checked both on each tick and between ticks via `changed()`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.scan_interval_s));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    match self.sweep(now_ms).await {
                        Ok(report) => info!(
                            orphaned_active = report.orphaned_active_reset,
                            stuck_workers = report.stuck_workers_cleared,
                            heartbeat_timeouts = report.heartbeat_timeouts_reclaimed,
                            stalled_jobs = report.stalled_jobs_reclaimed,
                            orphaned_pending = report.orphaned_pending_removed,
                            "reclaimer sweep complete"
                        ),
                        Err(e) => warn!("reclaimer sweep failed: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reclaimer shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_model::{Job, JobSpec, JobStatus};
    use broker_store::MockStore;
    use mockall::predicate::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn sweep_heartbeat_timeouts_fails_the_active_job_and_marks_worker_offline() {
        let mut store = MockStore::new();
        store
            .expect_keys()
            .with(eq("jobs:active:*"))
            .returning(|_| Ok(vec!["jobs:active:w-1".to_string()]));
        store
            .expect_set_is_member()
            .with(eq("workers:active"), eq("w-1"))
            .returning(|_, _| Ok(true));
        store
            .expect_hash_exists()
            .with(eq("worker:w-1:heartbeat"))
            .returning(|_| Ok(false));

        let job = Job::from_spec("j-1", JobSpec::new("sim", serde_json::Value::Null), 0);
        let json = serde_json::to_string(&job).unwrap();
        store.expect_hash_get_all().with(eq("jobs:active:w-1")).returning(move |_| {
            Ok(HashMap::from([("j-1".to_string(), json.clone())]))
        });
        store
            .expect_hash_get_all()
            .with(eq("job:j-1"))
            .returning(move |_| {
                Ok(crate::serialize::to_hash(&Job::from_spec(
                    "j-1",
                    JobSpec::new("sim", serde_json::Value::Null),
                    0,
                ))
                .unwrap())
            });
        store.expect_hash_set_many().returning(|_, _| Ok(()));
        store.expect_zset_add().returning(|_, _, _| Ok(()));
        store.expect_hash_del_field().returning(|_, _| Ok(()));
        store.expect_publish().returning(|_, _| Ok(()));
        store
            .expect_set_remove()
            .with(eq("workers:active"), eq("w-1"))
            .returning(|_, _| Ok(()));
        store
            .expect_hash_set()
            .withf(|key, field, _| key == "worker:w-1" && field == "status")
            .returning(|_, _, _| Ok(()));

        let reclaimer = Reclaimer::new(Arc::new(store), ReclaimerConfig::default());
        let report = reclaimer.sweep_heartbeat_timeouts(5_000).await.unwrap();
        assert_eq!(report, 1);
    }

    #[tokio::test]
    async fn sweep_orphaned_active_resets_jobs_for_workers_missing_from_active_set() {
        let mut store = MockStore::new();
        store
            .expect_keys()
            .with(eq("jobs:active:*"))
            .returning(|_| Ok(vec!["jobs:active:w-1".to_string()]));
        store
            .expect_set_is_member()
            .with(eq("workers:active"), eq("w-1"))
            .returning(|_, _| Ok(false));

        let job = Job::from_spec("j-1", JobSpec::new("sim", serde_json::Value::Null), 0);
        let json = serde_json::to_string(&job).unwrap();
        store.expect_hash_get_all().with(eq("jobs:active:w-1")).returning(move |_| {
            Ok(HashMap::from([("j-1".to_string(), json.clone())]))
        });
        store
            .expect_hash_get_all()
            .with(eq("job:j-1"))
            .returning(move |_| {
                Ok(crate::serialize::to_hash(&Job::from_spec(
                    "j-1",
                    JobSpec::new("sim", serde_json::Value::Null),
                    0,
                ))
                .unwrap())
            });
        store.expect_hash_set_many().returning(|_, _| Ok(()));
        store.expect_zset_add().returning(|_, _, _| Ok(()));
        store
            .expect_hash_del_key()
            .with(eq("jobs:active:w-1"))
            .returning(|_| Ok(()));

        let reclaimer = Reclaimer::new(Arc::new(store), ReclaimerConfig::default());
        let report = reclaimer.sweep_orphaned_active().await.unwrap();
        assert_eq!(report, 1);
    }

    #[tokio::test]
    async fn sweep_stuck_workers_clears_current_job_when_it_is_already_terminal() {
        let mut store = MockStore::new();
        store
            .expect_set_members()
            .with(eq("workers:active"))
            .returning(|_| Ok(vec!["w-1".to_string()]));

        let mut worker = broker_model::Worker::new(
            "w-1",
            "host-a",
            broker_model::Capabilities::default(),
            0,
        );
        worker.current_job_id = Some("j-1".to_string());
        let worker_hash = crate::serialize::to_hash(&worker).unwrap();
        store
            .expect_hash_get_all()
            .with(eq("worker:w-1"))
            .returning(move |_| Ok(worker_hash.clone()));

        let mut job = Job::from_spec("j-1", JobSpec::new("sim", serde_json::Value::Null), 0);
        job.status = JobStatus::Completed;
        let job_hash = crate::serialize::to_hash(&job).unwrap();
        store
            .expect_hash_get_all()
            .with(eq("job:j-1"))
            .returning(move |_| Ok(job_hash.clone()));

        store
            .expect_hash_del_field()
            .withf(|key, field| key == "worker:w-1" && field == "current_job_id")
            .returning(|_, _| Ok(()));
        store
            .expect_hash_set()
            .withf(|key, field, _| key == "worker:w-1" && field == "status")
            .returning(|_, _, _| Ok(()));
        store.expect_publish().returning(|_, _| Ok(()));

        let reclaimer = Reclaimer::new(Arc::new(store), ReclaimerConfig::default());
        let report = reclaimer.sweep_stuck_workers(5_000).await.unwrap();
        assert_eq!(report, 1);
    }

    #[tokio::test]
    async fn sweep_orphaned_pending_drops_entries_with_no_job_hash() {
        let mut store = MockStore::new();
        store
            .expect_zset_range_desc()
            .with(eq("jobs:pending"), eq(0), eq(-1))
            .returning(|_, _, _| Ok(vec![("ghost".to_string(), 1.0)]));
        store
            .expect_hash_get_all()
            .with(eq("job:ghost"))
            .returning(|_| Ok(HashMap::new()));
        store
            .expect_zset_remove()
            .with(eq("jobs:pending"), eq("ghost"))
            .returning(|_, _| Ok(()));

        let reclaimer = Reclaimer::new(Arc::new(store), ReclaimerConfig::default());
        assert_eq!(reclaimer.sweep_orphaned_pending().await.unwrap(), 1);
    }
}
