//! The per-worker poll loop (§4.8): one task polling for claims, one spawned task per
//! in-flight job, bounded by a semaphore sized to `max_concurrent_jobs`.

use std::sync::Arc;
use std::time::Duration;

use broker_connector::{Connector, ConnectorJob, ProgressSink, ProgressUpdate};
use broker_core::{Broker, BrokerConfig, BrokerResult, JobRepository, ProgressBus, WorkerRegistry};
use broker_model::{Capabilities, Job, ProgressRecord, ProgressStatus, Worker};
use broker_resilience::{CircuitBreakerConfig, ResilienceLayer};
use broker_store::Store;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::WorkerRuntimeConfig;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Drives one worker's lifecycle end to end: registration, the claim/poll loop,
/// heartbeating, and graceful shutdown. Owns no connection of its own — everything
/// it does is through the `broker-core` components built over the shared [`Store`].
pub struct WorkerRuntime {
    broker: Broker,
    job_repository: JobRepository,
    worker_registry: WorkerRegistry,
    progress_bus: ProgressBus,
    connector: Arc<dyn Connector>,
    resilience: Arc<ResilienceLayer>,
    worker_id: String,
    machine_id: String,
    capabilities: Capabilities,
    config: WorkerRuntimeConfig,
}

impl WorkerRuntime {
    pub fn new(
        store: Arc<dyn Store>,
        connector: Arc<dyn Connector>,
        worker_id: impl Into<String>,
        machine_id: impl Into<String>,
        capabilities: Capabilities,
        broker_config: BrokerConfig,
        config: WorkerRuntimeConfig,
    ) -> Self {
        Self::with_resilience(
            store,
            connector,
            Arc::new(ResilienceLayer::new(CircuitBreakerConfig::default())),
            worker_id,
            machine_id,
            capabilities,
            broker_config,
            config,
        )
    }

    /// Like [`Self::new`] but with a caller-supplied [`ResilienceLayer`], so a
    /// connector's circuit breaker thresholds can be tuned per service type.
    pub fn with_resilience(
        store: Arc<dyn Store>,
        connector: Arc<dyn Connector>,
        resilience: Arc<ResilienceLayer>,
        worker_id: impl Into<String>,
        machine_id: impl Into<String>,
        capabilities: Capabilities,
        broker_config: BrokerConfig,
        config: WorkerRuntimeConfig,
    ) -> Self {
        Self {
            broker: Broker::new(store.clone(), broker_config),
            job_repository: JobRepository::new(store.clone()),
            worker_registry: WorkerRegistry::new(store.clone()),
            progress_bus: ProgressBus::new(store.clone()),
            connector,
            resilience,
            worker_id: worker_id.into(),
            machine_id: machine_id.into(),
            capabilities,
            config,
        }
    }

    /// Registers the worker, then runs the poll/heartbeat loop until `shutdown`
    /// reports `true`. In-flight job handlers are drained (not abandoned) before
    /// returning: each one observes the same shutdown signal and fails its job with
    /// `can_retry=true` so another worker can pick it up (§4.8).
    #[instrument(skip(self, shutdown), fields(worker_id = %self.worker_id))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> BrokerResult<()> {
        let now = now_ms();
        self.worker_registry
            .register(&self.worker_id, &self.machine_id, self.capabilities.clone(), now)
            .await?;
        // Registration leaves the worker `Initializing`; flip it to `Idle` so it is
        // immediately eligible to be shown as available (the field it clears,
        // `current_job_id`, is already unset).
        self.worker_registry.clear_current_job(&self.worker_id, now).await?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs));
        let job_timeout = Duration::from_secs(self.config.job_timeout_minutes * 60);
        let mut in_flight: JoinSet<()> = JoinSet::new();

        let mut poll_interval = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        let mut heartbeat_interval = tokio::time::interval(Duration::from_millis(self.config.heartbeat_interval_ms));

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    self.try_claim_and_spawn(&semaphore, job_timeout, &mut in_flight, &shutdown).await;
                }
                _ = heartbeat_interval.tick() => {
                    if let Err(e) = self.worker_registry.heartbeat(&self.worker_id, now_ms(), self.config.heartbeat_ttl_secs).await {
                        warn!("heartbeat failed: {e}");
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!("job handler task panicked: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("worker runtime shutting down, draining in-flight jobs");
                        break;
                    }
                }
            }
        }

        while in_flight.join_next().await.is_some() {}
        self.worker_registry.mark_offline(&self.worker_id, now_ms()).await?;
        Ok(())
    }

    async fn try_claim_and_spawn(
        &self,
        semaphore: &Arc<Semaphore>,
        job_timeout: Duration,
        in_flight: &mut JoinSet<()>,
        shutdown: &watch::Receiver<bool>,
    ) {
        if *shutdown.borrow() {
            return;
        }
        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
            return; // at capacity
        };

        let worker = Worker::new(&self.worker_id, &self.machine_id, self.capabilities.clone(), now_ms());
        let job = match self.broker.claim(&worker, now_ms()).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                warn!("claim attempt failed: {e}");
                return;
            }
        };

        let handler = JobHandler {
            job_repository: self.job_repository.clone(),
            worker_registry: self.worker_registry.clone(),
            progress_bus: self.progress_bus.clone(),
            connector: self.connector.clone(),
            resilience: self.resilience.clone(),
            worker_id: self.worker_id.clone(),
            job_timeout,
        };
        let shutdown = shutdown.clone();
        in_flight.spawn(async move {
            handler.run(job, shutdown).await;
            drop(permit);
        });
    }
}

/// The per-job lifecycle (§4.8 step 3): transition to `in_progress`, invoke the
/// connector with a progress sink, resolve with `Complete` or `Fail`. Split out of
/// `WorkerRuntime` so it can be moved wholesale into a spawned task.
struct JobHandler {
    job_repository: JobRepository,
    worker_registry: WorkerRegistry,
    progress_bus: ProgressBus,
    connector: Arc<dyn Connector>,
    resilience: Arc<ResilienceLayer>,
    worker_id: String,
    job_timeout: Duration,
}

enum Outcome {
    Completed(serde_json::Value),
    Failed { error: String, can_retry: bool },
}

impl JobHandler {
    #[instrument(skip(self, job, shutdown), fields(job_id = %job.id, worker_id = %self.worker_id))]
    async fn run(&self, job: Job, mut shutdown: watch::Receiver<bool>) {
        let job_id = job.id.clone();

        if let Err(e) = self
            .job_repository
            .start_processing(&job_id, &self.worker_id, now_ms())
            .await
        {
            warn!("failed to transition job to in_progress: {e}");
            return;
        }

        if let Err(e) = self.resilience.check() {
            warn!(job_id, "resilience layer blocked the connector call: {e}");
            self.resolve(
                &job_id,
                Outcome::Failed {
                    error: format!("connector unavailable: {e}"),
                    can_retry: true,
                },
            )
            .await;
            return;
        }

        let connector_job = ConnectorJob {
            id: job_id.clone(),
            service_type: job.service_required.clone(),
            payload: job.payload.clone(),
            requirements: job.requirements.clone(),
        };
        let sink = self.progress_sink(&job_id);

        let outcome = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => {
                let _ = self.connector.cancel_job(&job_id).await;
                Outcome::Failed { error: "worker shutting down".to_string(), can_retry: true }
            }
            result = tokio::time::timeout(self.job_timeout, self.connector.process_job(connector_job, sink)) => {
                match result {
                    Ok(Ok(value)) => {
                        self.resilience.record_success();
                        Outcome::Completed(value)
                    }
                    Ok(Err(e)) => {
                        self.resilience.record_failure();
                        Outcome::Failed { error: e.to_string(), can_retry: e.retryable() }
                    }
                    Err(_elapsed) => {
                        self.resilience.record_failure();
                        let _ = self.connector.cancel_job(&job_id).await;
                        Outcome::Failed {
                            error: format!("job exceeded {:?} timeout", self.job_timeout),
                            can_retry: true,
                        }
                    }
                }
            }
        };

        self.resolve(&job_id, outcome).await;
    }

    fn progress_sink(&self, job_id: &str) -> ProgressSink {
        let progress_bus = self.progress_bus.clone();
        let worker_id = self.worker_id.clone();
        let job_id = job_id.to_string();
        ProgressSink::new(move |update: ProgressUpdate| {
            let progress_bus = progress_bus.clone();
            let worker_id = worker_id.clone();
            let job_id = job_id.clone();
            tokio::spawn(async move {
                let mut record =
                    ProgressRecord::new(&job_id, &worker_id, update.progress, ProgressStatus::Processing, now_ms());
                if let Some(message) = update.message {
                    record = record.with_message(message);
                }
                if let (Some(current), Some(total)) = (update.current_step, update.total_steps) {
                    record = record.with_step(current, total);
                }
                if let Err(e) = progress_bus.record(record).await {
                    warn!(job_id, "failed to record progress: {e}");
                }
            });
        })
    }

    async fn resolve(&self, job_id: &str, outcome: Outcome) {
        let now = now_ms();
        match outcome {
            Outcome::Completed(result) => {
                let final_progress = ProgressRecord::new(job_id, &self.worker_id, 100, ProgressStatus::Completed, now);
                if let Err(e) = self.progress_bus.record(final_progress).await {
                    warn!(job_id, "failed to record completion progress: {e}");
                }
                if let Err(e) = self.job_repository.complete(job_id, &self.worker_id, result, now).await {
                    warn!(job_id, "failed to mark job completed: {e}");
                }
                if let Err(e) = self.worker_registry.increment_jobs_processed(&self.worker_id).await {
                    warn!("failed to bump jobs_processed: {e}");
                }
            }
            Outcome::Failed { error, can_retry } => {
                let final_progress = ProgressRecord::new(job_id, &self.worker_id, 0, ProgressStatus::Failed, now)
                    .with_message(error.clone());
                if let Err(e) = self.progress_bus.record(final_progress).await {
                    warn!(job_id, "failed to record failure progress: {e}");
                }
                if let Err(e) = self
                    .job_repository
                    .fail(job_id, &self.worker_id, &error, can_retry, now)
                    .await
                {
                    warn!(job_id, "failed to mark job failed: {e}");
                }
                if let Err(e) = self.worker_registry.increment_jobs_failed(&self.worker_id).await {
                    warn!("failed to bump jobs_failed: {e}");
                }
            }
        }

        if let Err(e) = self.worker_registry.clear_current_job(&self.worker_id, now).await {
            warn!("failed to clear current job: {e}");
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }
    while shutdown.changed().await.is_ok() {
        if *shutdown.borrow() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_connector::{ConnectorError, MockConnector};
    use broker_model::JobSpec;
    use broker_store::MockStore;
    use mockall::predicate::*;
    use serde_json::json;

    fn pending_job() -> Job {
        Job::from_spec("j-1", JobSpec::new("sim", json!({"prompt": "a cat"})), 0)
    }

    #[tokio::test]
    async fn job_handler_completes_and_records_progress() {
        let mut connector = MockConnector::new();
        connector.expect_process_job().returning(|_job, sink| {
            sink.report(ProgressUpdate::new(50).with_message("halfway"));
            Ok(json!({"ok": true}))
        });

        let mut store = MockStore::new();
        let job = pending_job();
        let hash = broker_core::serialize::to_hash(&job).unwrap();
        store
            .expect_hash_get_all()
            .with(eq("job:j-1"))
            .returning(move |_| Ok(hash.clone()));
        store.expect_hash_set_many().returning(|_, _| Ok(()));
        store.expect_hash_set().returning(|_, _, _| Ok(()));
        store.expect_hash_del_field().returning(|_, _| Ok(()));
        store.expect_expire().returning(|_, _| Ok(()));
        store.expect_stream_append().returning(|_, _| Ok("1-0".to_string()));
        store.expect_publish().returning(|_, _| Ok(()));

        let store: Arc<dyn Store> = Arc::new(store);
        let handler = JobHandler {
            job_repository: JobRepository::new(store.clone()),
            worker_registry: WorkerRegistry::new(store.clone()),
            progress_bus: ProgressBus::new(store.clone()),
            connector: Arc::new(connector),
            resilience: Arc::new(ResilienceLayer::new(CircuitBreakerConfig::default())),
            worker_id: "w-1".to_string(),
            job_timeout: Duration::from_secs(1),
        };

        let (_tx, rx) = watch::channel(false);
        handler.run(job, rx).await;
    }

    #[tokio::test]
    async fn job_handler_fails_non_retryable_connector_rejection_without_retry() {
        let mut connector = MockConnector::new();
        connector.expect_process_job().returning(|_job, _sink| {
            Err(ConnectorError::Rejected {
                connector: "sim".to_string(),
                job_id: "j-1".to_string(),
                message: "bad payload".to_string(),
                retryable: false,
            })
        });

        let mut store = MockStore::new();
        let job = pending_job();
        let hash = broker_core::serialize::to_hash(&job).unwrap();
        store
            .expect_hash_get_all()
            .with(eq("job:j-1"))
            .returning(move |_| Ok(hash.clone()));
        store.expect_hash_set_many().returning(|_, _| Ok(()));
        store.expect_hash_set().returning(|_, _, _| Ok(()));
        store.expect_hash_del_key().returning(|_| Ok(()));
        store.expect_stream_append().returning(|_, _| Ok("1-0".to_string()));
        store
            .expect_publish()
            .withf(|channel, payload| channel != "job_failed" || payload.contains("\"will_retry\":false"))
            .returning(|_, _| Ok(()));

        let store: Arc<dyn Store> = Arc::new(store);
        let handler = JobHandler {
            job_repository: JobRepository::new(store.clone()),
            worker_registry: WorkerRegistry::new(store.clone()),
            progress_bus: ProgressBus::new(store.clone()),
            connector: Arc::new(connector),
            resilience: Arc::new(ResilienceLayer::new(CircuitBreakerConfig::default())),
            worker_id: "w-1".to_string(),
            job_timeout: Duration::from_secs(1),
        };

        let (_tx, rx) = watch::channel(false);
        handler.run(job, rx).await;
    }
}
