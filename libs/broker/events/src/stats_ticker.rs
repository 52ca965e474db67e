//! Periodic aggregate snapshot broadcast to monitors only (§4.11). Reads directly
//! from the store on every tick; no caching layer sits in front of it.

use std::sync::Arc;

use axum::extract::ws::Message;
use broker_core::{JobQuery, JobRepository, WorkerRegistry};
use broker_model::{JobStatus, WorkerStatus};
use broker_store::Store;
use tokio::sync::watch;
use tracing::{instrument, warn};

use crate::registry::ConnectionRegistry;
use crate::wire::monitor::{JobCounts, MonitorMessage, RecentJobs, SystemSnapshot, WorkerCounts, WorkerSnapshot};

/// How many ids each "recent" bucket in a stats tick carries (§6.3).
const RECENT_CAP: usize = 20;

pub struct StatsTicker {
    job_repository: JobRepository,
    worker_registry: WorkerRegistry,
    monitors: Arc<ConnectionRegistry>,
    interval_ms: u64,
}

impl StatsTicker {
    pub fn new(store: Arc<dyn Store>, monitors: Arc<ConnectionRegistry>, interval_ms: u64) -> Self {
        Self {
            job_repository: JobRepository::new(store.clone()),
            worker_registry: WorkerRegistry::new(store),
            monitors,
            interval_ms,
        }
    }

    #[instrument(skip(self))]
    async fn tick(&self, now_ms: i64) {
        let queue_stats = match self.job_repository.queue_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("stats ticker: queue_stats failed: {e}");
                return;
            }
        };
        let workers = match self.worker_registry.list_active().await {
            Ok(workers) => workers,
            Err(e) => {
                warn!("stats ticker: list_active failed: {e}");
                return;
            }
        };

        let mut worker_counts = WorkerCounts::default();
        worker_counts.total = workers.len() as u64;
        for worker in &workers {
            match worker.status {
                WorkerStatus::Idle => worker_counts.idle += 1,
                WorkerStatus::Busy => worker_counts.busy += 1,
                WorkerStatus::Offline => worker_counts.offline += 1,
                WorkerStatus::Initializing => {}
            }
        }

        let job_counts = JobCounts {
            pending: queue_stats.pending,
            active: queue_stats.active,
            completed: queue_stats.completed,
            failed: queue_stats.failed,
        };

        let worker_details: Vec<WorkerSnapshot> = workers
            .iter()
            .map(|worker| WorkerSnapshot {
                worker_id: worker.id.clone(),
                status: worker.status.to_string(),
                current_job_id: worker.current_job_id.clone(),
            })
            .collect();

        let mut active = self.recent(JobStatus::Assigned).await;
        active.extend(self.recent(JobStatus::InProgress).await);
        active.truncate(RECENT_CAP);

        let recent = RecentJobs {
            pending: self.recent(JobStatus::Pending).await,
            active,
            completed: self.recent(JobStatus::Completed).await,
            failed: self.recent(JobStatus::Failed).await,
        };

        let message = MonitorMessage::StatsBroadcast {
            timestamp: now_ms,
            connections: self.monitors.len().await as u32,
            workers: worker_counts.total as u32,
            subscriptions: 0,
            system: SystemSnapshot {
                queues: job_counts.clone(),
                jobs: job_counts,
                workers: worker_counts,
                worker_details,
                recent,
            },
        };

        if let Ok(json) = serde_json::to_string(&message) {
            self.monitors.broadcast(Message::Text(json.into())).await;
        }
    }

    /// Most recent job ids in `status`, capped at [`RECENT_CAP`]; a lookup failure
    /// degrades to an empty list rather than dropping the whole tick.
    async fn recent(&self, status: JobStatus) -> Vec<String> {
        let filter = JobQuery {
            status: Some(status),
            ..Default::default()
        };
        match self.job_repository.recent_ids(&filter, RECENT_CAP).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("stats ticker: recent_ids({status:?}) failed: {e}");
                Vec::new()
            }
        }
    }

    /// Ticks every `interval_ms` until `shutdown` reports `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(self.interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(chrono::Utc::now().timestamp_millis()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
