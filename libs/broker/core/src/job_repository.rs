//! Job CRUD and lifecycle transitions (§4.2, §4.6).
//!
//! The claim itself — the atomic conditional remove from `jobs:pending` — lives in
//! [`crate::broker::Broker`]; this repository owns everything around it: creating
//! jobs, recording a win, and resolving a run's outcome (retry, archive, cancel).

use std::sync::Arc;

use broker_model::{score_for_job, Job, JobSpec, JobStatus, ProgressRecord, ProgressStatus};
use broker_store::Store;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::error::{BrokerError, BrokerResult};
use crate::events::{publish, BrokerEvent};
use crate::keys;
use crate::progress_bus::ProgressBus;
use crate::serialize::{from_hash, to_hash};

/// `jobs:completed` entries expire 24h after archival (§6.5).
const COMPLETED_TTL_SECS: i64 = 24 * 3_600;
/// `jobs:failed` entries expire 7 days after archival (§6.5).
const FAILED_TTL_SECS: i64 = 7 * 24 * 3_600;

/// Optional filters for [`JobRepository::query`]; `None` means "don't filter on
/// this dimension". Pagination is a plain offset/limit over the matching set since
/// the store keeps no secondary index ordered any other way than by job id.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub customer_id: Option<String>,
    pub service_required: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct JobRepository {
    store: Arc<dyn Store>,
    progress_bus: ProgressBus,
}

impl JobRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            progress_bus: ProgressBus::new(store.clone()),
            store,
        }
    }

    /// Validates `spec`, assigns an id, persists the job, and enqueues it on the
    /// pending sorted set at its priority+FIFO score (§4.3).
    #[instrument(skip(self, spec))]
    pub async fn submit(&self, spec: JobSpec, now_ms: i64) -> BrokerResult<Job> {
        spec.validate()?;

        let id = Uuid::now_v7().to_string();
        let job = Job::from_spec(&id, spec, now_ms);

        self.store
            .hash_set_many(&keys::job(&job.id), &to_hash(&job)?)
            .await?;
        self.store
            .zset_add(keys::JOBS_PENDING, &job.id, score_for_job(&job))
            .await?;

        publish(
            self.store.as_ref(),
            &BrokerEvent::JobSubmitted {
                job_id: job.id.clone(),
                service_required: job.service_required.clone(),
                priority: job.priority,
                timestamp: now_ms,
            },
        )
        .await?;

        Ok(job)
    }

    pub async fn get(&self, job_id: &str) -> BrokerResult<Option<Job>> {
        let fields = self.store.hash_get_all(&keys::job(job_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(from_hash(fields)?))
    }

    async fn require(&self, job_id: &str) -> BrokerResult<Job> {
        self.get(job_id)
            .await?
            .ok_or_else(|| BrokerError::NotFound(format!("job {job_id}")))
    }

    async fn persist(&self, job: &Job) -> BrokerResult<()> {
        self.store
            .hash_set_many(&keys::job(&job.id), &to_hash(job)?)
            .await?;
        Ok(())
    }

    /// `jobs:active:<workerId>` is a true sub-map (§6.5: "jobId -> serialized job"),
    /// not the job's own flattened field set, so more than one job can be tracked
    /// per worker under `max_concurrent_jobs > 1`.
    async fn put_active(&self, worker_id: &str, job: &Job) -> BrokerResult<()> {
        let json = serde_json::to_string(job)
            .map_err(|e| BrokerError::Worker(broker_resilience::WorkerError::Serialization(e)))?;
        self.store
            .hash_set(&keys::jobs_active(worker_id), &job.id, &json)
            .await?;
        Ok(())
    }

    async fn remove_active(&self, worker_id: &str, job_id: &str) -> BrokerResult<()> {
        self.store
            .hash_del_field(&keys::jobs_active(worker_id), job_id)
            .await?;
        Ok(())
    }

    /// Records a winning claim: moves the job to `Assigned`, mirrors it into
    /// `jobs:active:<workerId>`, appends an `assigned` progress record (§4.2's
    /// "append to progress stream"), and announces it. Called by the broker
    /// immediately after its conditional remove from `jobs:pending` succeeds.
    #[instrument(skip(self))]
    pub async fn mark_assigned(&self, job_id: &str, worker_id: &str, now_ms: i64) -> BrokerResult<Job> {
        let mut job = self.require(job_id).await?;
        job.status = JobStatus::Assigned;
        job.worker_id = Some(worker_id.to_string());
        job.assigned_at = Some(now_ms);
        self.persist(&job).await?;
        self.put_active(worker_id, &job).await?;

        self.progress_bus
            .record(ProgressRecord::new(job_id, worker_id, 0, ProgressStatus::Assigned, now_ms))
            .await?;

        publish(
            self.store.as_ref(),
            &BrokerEvent::JobAssigned {
                job_id: job.id.clone(),
                worker_id: worker_id.to_string(),
                timestamp: now_ms,
            },
        )
        .await?;

        Ok(job)
    }

    /// `Assigned` -> `InProgress`, once the worker has actually started the
    /// connector call rather than just having claimed the job, appending progress
    /// `processing/0` (§4.2).
    pub async fn start_processing(&self, job_id: &str, worker_id: &str, now_ms: i64) -> BrokerResult<Job> {
        let mut job = self.require(job_id).await?;
        if job.status != JobStatus::Assigned {
            return Err(BrokerError::CapabilityMismatch(format!(
                "job {job_id} is {:?}, expected Assigned",
                job.status
            )));
        }
        job.status = JobStatus::InProgress;
        job.started_at = Some(now_ms);
        self.persist(&job).await?;
        self.put_active(worker_id, &job).await?;

        self.progress_bus
            .record(ProgressRecord::new(job_id, worker_id, 0, ProgressStatus::Processing, now_ms))
            .await?;

        Ok(job)
    }

    /// Marks the job completed, archives it, and clears the worker's active entry.
    #[instrument(skip(self, result))]
    pub async fn complete(
        &self,
        job_id: &str,
        worker_id: &str,
        result: serde_json::Value,
        now_ms: i64,
    ) -> BrokerResult<Job> {
        let mut job = self.require(job_id).await?;
        if job.status.is_terminal() {
            return Err(BrokerError::AlreadyTerminal(job_id.to_string()));
        }
        job.status = JobStatus::Completed;
        job.completed_at = Some(now_ms);
        self.persist(&job).await?;
        self.store
            .hash_set(&keys::job(job_id), "result", &result.to_string())
            .await?;
        self.archive_completed(&job, &result).await?;
        self.remove_active(worker_id, job_id).await?;

        publish(
            self.store.as_ref(),
            &BrokerEvent::JobCompleted {
                job_id: job.id.clone(),
                worker_id: worker_id.to_string(),
                result,
                timestamp: now_ms,
            },
        )
        .await?;

        Ok(job)
    }

    /// Resolves a failed run (§4.6): retries if the caller allows it and
    /// `retry_count` is still under `max_retries`, re-enqueuing at the job's original
    /// score so a retried job does not jump the queue ahead of jobs that arrived
    /// after its first attempt; otherwise archives it as permanently failed.
    /// `can_retry` is `false` for errors a retry can never fix (e.g. a connector's
    /// non-retryable rejection); everything else — heartbeat timeouts, progress
    /// timeouts, retryable connector errors — passes `true` and defers to the
    /// retry-count budget.
    #[instrument(skip(self))]
    pub async fn fail(
        &self,
        job_id: &str,
        worker_id: &str,
        error: &str,
        can_retry: bool,
        now_ms: i64,
    ) -> BrokerResult<Job> {
        let mut job = self.require(job_id).await?;
        if job.status.is_terminal() {
            return Err(BrokerError::AlreadyTerminal(job_id.to_string()));
        }

        job.retry_count += 1;
        job.last_failed_worker = Some(worker_id.to_string());
        job.last_error = Some(error.to_string());
        let will_retry = can_retry && job.retry_count < job.max_retries;

        if will_retry {
            job.status = JobStatus::Pending;
            job.worker_id = None;
            job.assigned_at = None;
            job.started_at = None;
            self.persist(&job).await?;
            self.store
                .zset_add(keys::JOBS_PENDING, &job.id, score_for_job(&job))
                .await?;
        } else {
            job.status = JobStatus::Failed;
            job.failed_at = Some(now_ms);
            self.persist(&job).await?;
            self.archive_failed(&job, error).await?;
        }

        self.remove_active(worker_id, job_id).await?;

        publish(
            self.store.as_ref(),
            &BrokerEvent::JobFailed {
                job_id: job.id.clone(),
                worker_id: Some(worker_id.to_string()),
                error: error.to_string(),
                will_retry,
                retry_count: job.retry_count,
                timestamp: now_ms,
            },
        )
        .await?;

        Ok(job)
    }

    /// Cancels a non-terminal job. A pending job is simply dequeued; an
    /// assigned/in-progress job is marked cancelled here and its worker discovers
    /// this on its next status check or heartbeat (§4.2's orthogonal cancellation).
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: &str, reason: &str, now_ms: i64) -> BrokerResult<Job> {
        let mut job = self.require(job_id).await?;
        if job.status.is_terminal() {
            return Err(BrokerError::AlreadyTerminal(job_id.to_string()));
        }

        self.store.zset_remove(keys::JOBS_PENDING, job_id).await?;
        if let Some(worker_id) = &job.worker_id {
            self.remove_active(worker_id, job_id).await?;
        }

        job.status = JobStatus::Cancelled;
        job.cancelled_at = Some(now_ms);
        self.persist(&job).await?;

        publish(
            self.store.as_ref(),
            &BrokerEvent::JobCancelled {
                job_id: job.id.clone(),
                reason: reason.to_string(),
                timestamp: now_ms,
            },
        )
        .await?;

        Ok(job)
    }

    /// Raw reset back to `Pending` for a job whose worker vanished without ever
    /// reporting failure (Sweep A, §4.8: "orphaned active job"). Unlike [`fail`],
    /// this does not touch `retry_count` or `last_failed_worker` — the job was never
    /// told it failed, so it gets a clean re-queue at its original score rather than
    /// burning a retry.
    pub async fn reset_to_pending(&self, job_id: &str) -> BrokerResult<Job> {
        let mut job = self.require(job_id).await?;
        job.status = JobStatus::Pending;
        job.worker_id = None;
        job.assigned_at = None;
        job.started_at = None;
        self.persist(&job).await?;
        self.store
            .zset_add(keys::JOBS_PENDING, &job.id, score_for_job(&job))
            .await?;
        Ok(job)
    }

    /// Most recent `limit` job ids matching `filter`, newest first — backs the
    /// stats ticker's "recent jobs" lists (§6.3). Built on the same linear
    /// [`query`] scan as the operator-facing query surface.
    pub async fn recent_ids(&self, filter: &JobQuery, limit: usize) -> BrokerResult<Vec<String>> {
        let mut matched = self.query(filter).await?;
        matched.sort_by_key(|job| std::cmp::Reverse(job.created_at));
        Ok(matched.into_iter().take(limit).map(|job| job.id).collect())
    }

    /// Archives a `{success, data, completed_at}` tuple into `jobs:completed`
    /// (§6.5), refreshing its 24h TTL on every write.
    async fn archive_completed(&self, job: &Job, result: &serde_json::Value) -> BrokerResult<()> {
        let entry = serde_json::json!({
            "success": true,
            "data": result,
            "completed_at": job.completed_at,
        });
        self.store
            .hash_set(keys::JOBS_COMPLETED, &job.id, &entry.to_string())
            .await?;
        self.store.expire(keys::JOBS_COMPLETED, COMPLETED_TTL_SECS).await?;
        Ok(())
    }

    /// Archives a `{error, failed_at, retry_count}` tuple into `jobs:failed`
    /// (§6.5), refreshing its 7-day TTL on every write.
    async fn archive_failed(&self, job: &Job, error: &str) -> BrokerResult<()> {
        let entry = serde_json::json!({
            "error": error,
            "failed_at": job.failed_at,
            "retry_count": job.retry_count,
        });
        self.store
            .hash_set(keys::JOBS_FAILED, &job.id, &entry.to_string())
            .await?;
        self.store.expire(keys::JOBS_FAILED, FAILED_TTL_SECS).await?;
        Ok(())
    }

    /// Linear scan over `job:*`, filtered in memory. Fine for the operator-facing
    /// query surface (§6.1); not on any hot path.
    pub async fn query(&self, filter: &JobQuery) -> BrokerResult<Vec<Job>> {
        let keys = self.store.keys("job:*").await?;
        let mut matched = Vec::new();
        for key in keys {
            let Some(job_id) = key.strip_prefix("job:") else {
                continue;
            };
            if job_id.contains(':') {
                continue; // skip job:<id>:progress snapshots
            }
            let Some(job) = self.get(job_id).await? else {
                continue;
            };
            if let Some(status) = filter.status {
                if job.status != status {
                    continue;
                }
            }
            if let Some(customer_id) = &filter.customer_id {
                if job.customer_id.as_deref() != Some(customer_id.as_str()) {
                    continue;
                }
            }
            if let Some(service) = &filter.service_required {
                if &job.service_required != service {
                    continue;
                }
            }
            matched.push(job);
        }
        matched.sort_by_key(|job| job.created_at);

        let limit = if filter.limit == 0 { matched.len() } else { filter.limit };
        Ok(matched.into_iter().skip(filter.offset).take(limit).collect())
    }

    /// Queue depth across each terminal/non-terminal bucket (§6.1 `GetQueueStats`).
    pub async fn queue_stats(&self) -> BrokerResult<QueueStats> {
        let pending = self.store.zset_card(keys::JOBS_PENDING).await?;
        let completed = self.store.hash_len(keys::JOBS_COMPLETED).await?;
        let failed = self.store.hash_len(keys::JOBS_FAILED).await?;

        let active_keys = self.store.keys(keys::jobs_active_pattern()).await?;
        let mut active = 0u64;
        for key in active_keys {
            active += self.store.hash_len(&key).await?;
        }

        Ok(QueueStats {
            pending,
            active,
            completed,
            failed,
        })
    }
}
