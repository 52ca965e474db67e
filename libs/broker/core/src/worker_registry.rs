//! Worker lifecycle: registration, heartbeats, status transitions (§4.2, §4.8).
//!
//! Liveness is modeled as a TTL'd heartbeat hash rather than a timestamp comparison
//! done by the caller: `worker:<id>:heartbeat` carries an `EXPIRE` set on every
//! heartbeat, so a dead worker's liveness key simply stops existing once the TTL
//! elapses — the Reclaimer's heartbeat sweep (§4.7 sweep C) only needs `hash_exists`.

use std::sync::Arc;

use broker_model::{Capabilities, Worker, WorkerStatus};
use broker_store::Store;
use tracing::instrument;

use crate::error::{BrokerError, BrokerResult};
use crate::events::{publish, BrokerEvent};
use crate::keys;
use crate::serialize::{from_hash, to_hash};

#[derive(Clone)]
pub struct WorkerRegistry {
    store: Arc<dyn Store>,
}

impl WorkerRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Registers a new worker (or re-registers an existing id with fresh
    /// capabilities), adds it to the active set, and announces it.
    #[instrument(skip(self, capabilities))]
    pub async fn register(
        &self,
        worker_id: &str,
        machine_id: &str,
        capabilities: Capabilities,
        now_ms: i64,
    ) -> BrokerResult<Worker> {
        let worker = Worker::new(worker_id, machine_id, capabilities, now_ms);
        self.store
            .hash_set_many(&keys::worker(worker_id), &to_hash(&worker)?)
            .await?;
        self.store.set_add(keys::WORKERS_ACTIVE, worker_id).await?;

        publish(
            self.store.as_ref(),
            &BrokerEvent::WorkerRegistered {
                worker_id: worker_id.to_string(),
                machine_id: machine_id.to_string(),
                timestamp: now_ms,
            },
        )
        .await?;

        Ok(worker)
    }

    pub async fn get(&self, worker_id: &str) -> BrokerResult<Option<Worker>> {
        let fields = self.store.hash_get_all(&keys::worker(worker_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(from_hash(fields)?))
    }

    /// Refreshes the worker's liveness TTL and its `last_heartbeat` field.
    pub async fn heartbeat(&self, worker_id: &str, now_ms: i64, ttl_secs: i64) -> BrokerResult<()> {
        let heartbeat_key = keys::worker_heartbeat(worker_id);
        self.store
            .hash_set(&heartbeat_key, "ts", &now_ms.to_string())
            .await?;
        self.store.expire(&heartbeat_key, ttl_secs).await?;
        self.store
            .hash_set(&keys::worker(worker_id), "last_heartbeat", &now_ms.to_string())
            .await?;
        Ok(())
    }

    /// Whether the worker's heartbeat TTL has not yet expired.
    pub async fn is_alive(&self, worker_id: &str) -> BrokerResult<bool> {
        Ok(self
            .store
            .hash_exists(&keys::worker_heartbeat(worker_id))
            .await?)
    }

    /// Whether `worker_id` is still in `workers:active`, independent of heartbeat
    /// freshness — distinguishes "worker vanished without deregistering" (Sweep A)
    /// from "worker is registered but its heartbeat lapsed" (Sweep C).
    pub async fn is_active_member(&self, worker_id: &str) -> BrokerResult<bool> {
        Ok(self.store.set_is_member(keys::WORKERS_ACTIVE, worker_id).await?)
    }

    async fn set_status(&self, worker_id: &str, status: WorkerStatus, now_ms: i64) -> BrokerResult<()> {
        let worker = self
            .get(worker_id)
            .await?
            .ok_or_else(|| BrokerError::NotFound(format!("worker {worker_id}")))?;
        let old_status = worker.status;

        self.store
            .hash_set(&keys::worker(worker_id), "status", status.to_string().as_str())
            .await?;

        if old_status != status {
            publish(
                self.store.as_ref(),
                &BrokerEvent::WorkerStatus {
                    worker_id: worker_id.to_string(),
                    old_status: old_status.to_string(),
                    new_status: status.to_string(),
                    current_job_id: worker.current_job_id,
                    timestamp: now_ms,
                },
            )
            .await?;
        }
        Ok(())
    }

    /// Marks a worker busy and records the job it is now running (§4.4's claim
    /// protocol calls this immediately after a winning conditional remove).
    pub async fn assign_job(&self, worker_id: &str, job_id: &str, now_ms: i64) -> BrokerResult<()> {
        self.store
            .hash_set(&keys::worker(worker_id), "current_job_id", job_id)
            .await?;
        self.set_status(worker_id, WorkerStatus::Busy, now_ms).await
    }

    /// Clears the worker's current job and returns it to idle. Called on job
    /// completion, failure (including non-retryable), and cancellation.
    pub async fn clear_current_job(&self, worker_id: &str, now_ms: i64) -> BrokerResult<()> {
        self.store
            .hash_del_field(&keys::worker(worker_id), "current_job_id")
            .await?;
        self.set_status(worker_id, WorkerStatus::Idle, now_ms).await
    }

    pub async fn increment_jobs_processed(&self, worker_id: &str) -> BrokerResult<()> {
        let worker = self
            .get(worker_id)
            .await?
            .ok_or_else(|| BrokerError::NotFound(format!("worker {worker_id}")))?;
        self.store
            .hash_set(
                &keys::worker(worker_id),
                "jobs_processed",
                &(worker.jobs_processed + 1).to_string(),
            )
            .await?;
        Ok(())
    }

    pub async fn increment_jobs_failed(&self, worker_id: &str) -> BrokerResult<()> {
        let worker = self
            .get(worker_id)
            .await?
            .ok_or_else(|| BrokerError::NotFound(format!("worker {worker_id}")))?;
        self.store
            .hash_set(
                &keys::worker(worker_id),
                "jobs_failed",
                &(worker.jobs_failed + 1).to_string(),
            )
            .await?;
        Ok(())
    }

    /// Removes a worker from the active set and marks it offline. Does not delete
    /// its hash: history (jobs_processed/jobs_failed) stays queryable.
    #[instrument(skip(self))]
    pub async fn mark_offline(&self, worker_id: &str, now_ms: i64) -> BrokerResult<()> {
        self.store
            .set_remove(keys::WORKERS_ACTIVE, worker_id)
            .await?;
        self.store
            .hash_set(&keys::worker(worker_id), "status", WorkerStatus::Offline.to_string().as_str())
            .await?;

        publish(
            self.store.as_ref(),
            &BrokerEvent::WorkerDisconnected {
                worker_id: worker_id.to_string(),
                timestamp: now_ms,
            },
        )
        .await?;
        Ok(())
    }

    /// All worker ids currently in the active set, regardless of heartbeat freshness.
    pub async fn list_active_ids(&self) -> BrokerResult<Vec<String>> {
        Ok(self.store.set_members(keys::WORKERS_ACTIVE).await?)
    }

    pub async fn list_active(&self) -> BrokerResult<Vec<Worker>> {
        let ids = self.list_active_ids().await?;
        let mut workers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(worker) = self.get(&id).await? {
                workers.push(worker);
            }
        }
        Ok(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_store::MockStore;
    use mockall::predicate::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn register_persists_and_announces() {
        let mut store = MockStore::new();
        store
            .expect_hash_set_many()
            .with(eq("worker:w-1"), always())
            .returning(|_, _| Ok(()));
        store
            .expect_set_add()
            .with(eq("workers:active"), eq("w-1"))
            .returning(|_, _| Ok(()));
        store
            .expect_publish()
            .withf(|channel, _| channel == "worker_registered")
            .returning(|_, _| Ok(()));

        let registry = WorkerRegistry::new(Arc::new(store));
        let worker = registry
            .register("w-1", "host-a", Capabilities::default(), 1_000)
            .await
            .unwrap();
        assert_eq!(worker.id, "w-1");
    }

    #[tokio::test]
    async fn is_alive_reflects_heartbeat_key_existence() {
        let mut store = MockStore::new();
        store
            .expect_hash_exists()
            .with(eq("worker:w-1:heartbeat"))
            .returning(|_| Ok(false));

        let registry = WorkerRegistry::new(Arc::new(store));
        assert!(!registry.is_alive("w-1").await.unwrap());
    }

    #[tokio::test]
    async fn heartbeat_sets_ttl_on_liveness_key() {
        let mut store = MockStore::new();
        store
            .expect_hash_set()
            .with(eq("worker:w-1:heartbeat"), eq("ts"), eq("2000"))
            .returning(|_, _, _| Ok(()));
        store
            .expect_expire()
            .with(eq("worker:w-1:heartbeat"), eq(120))
            .returning(|_, _| Ok(()));
        store
            .expect_hash_set()
            .with(eq("worker:w-1"), eq("last_heartbeat"), eq("2000"))
            .returning(|_, _, _| Ok(()));

        let registry = WorkerRegistry::new(Arc::new(store));
        registry.heartbeat("w-1", 2_000, 120).await.unwrap();
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_worker() {
        let mut store = MockStore::new();
        store
            .expect_hash_get_all()
            .with(eq("worker:missing"))
            .returning(|_| Ok(HashMap::new()));

        let registry = WorkerRegistry::new(Arc::new(store));
        assert!(registry.get("missing").await.unwrap().is_none());
    }
}
