//! Dual-write progress path (§4.9): every update lands on the append-only
//! `progress:<jobId>` stream for history and is mirrored into a `job:<id>:progress`
//! snapshot hash so a late-joining reader can fetch "where is this job right now"
//! without replaying the whole stream, then published on `job_progress` for anyone
//! already listening.

use std::sync::Arc;

use broker_model::ProgressRecord;
use broker_store::Store;
use tracing::instrument;

use crate::error::BrokerResult;
use crate::events::{publish, BrokerEvent};
use crate::keys;
use crate::serialize::to_hash;

/// Thin façade over a [`Store`] for appending and reading progress records.
#[derive(Clone)]
pub struct ProgressBus {
    store: Arc<dyn Store>,
}

impl ProgressBus {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Appends `record` to the job's stream, refreshes its snapshot, and publishes a
    /// `JobProgress` event. The three writes are independent store calls (no
    /// transaction); a reader joining mid-update sees at worst a stale snapshot for
    /// one tick, never a torn record.
    #[instrument(skip(self, record), fields(job_id = %record.job_id, progress = record.progress))]
    pub async fn record(&self, record: ProgressRecord) -> BrokerResult<()> {
        let stream_key = keys::progress_stream(&record.job_id);
        let fields = to_hash(&record)?;
        self.store.stream_append(&stream_key, &fields).await?;

        let snapshot_key = keys::job_progress_snapshot(&record.job_id);
        self.store.hash_set_many(&snapshot_key, &fields).await?;

        publish(
            self.store.as_ref(),
            &BrokerEvent::JobProgress {
                job_id: record.job_id.clone(),
                worker_id: record.worker_id.clone(),
                progress: record.progress,
                status: record.status.to_string(),
                message: record.message.clone(),
                timestamp: record.updated_at,
            },
        )
        .await?;

        Ok(())
    }

    /// The most recent progress snapshot for a job, if any updates have been recorded.
    pub async fn snapshot(&self, job_id: &str) -> BrokerResult<Option<ProgressRecord>> {
        let snapshot_key = keys::job_progress_snapshot(job_id);
        let fields = self.store.hash_get_all(&snapshot_key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(crate::serialize::from_hash(fields)?))
    }

    /// Full history for a job, oldest first, as persisted on its progress stream.
    pub async fn history(&self, job_id: &str) -> BrokerResult<Vec<ProgressRecord>> {
        let stream_key = keys::progress_stream(job_id);
        let entries = self.store.stream_range(&stream_key, "-", "+").await?;
        entries
            .into_iter()
            .map(|entry| crate::serialize::from_hash::<ProgressRecord>(entry.fields))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_model::ProgressStatus;
    use broker_store::MockStore;
    use mockall::predicate::*;
    use std::collections::HashMap;

    fn record() -> ProgressRecord {
        ProgressRecord::new("j-1", "w-1", 40, ProgressStatus::Processing, 1_000)
    }

    #[tokio::test]
    async fn record_appends_snapshots_and_publishes() {
        let mut store = MockStore::new();
        store
            .expect_stream_append()
            .with(eq("progress:j-1"), always())
            .returning(|_, _| Ok("1-0".to_string()));
        store
            .expect_hash_set_many()
            .with(eq("job:j-1:progress"), always())
            .returning(|_, _| Ok(()));
        store
            .expect_publish()
            .withf(|channel, payload| channel == "job_progress" && payload.contains("j-1"))
            .returning(|_, _| Ok(()));

        let bus = ProgressBus::new(Arc::new(store));
        bus.record(record()).await.unwrap();
    }

    #[tokio::test]
    async fn snapshot_returns_none_when_nothing_recorded() {
        let mut store = MockStore::new();
        store
            .expect_hash_get_all()
            .with(eq("job:j-1:progress"))
            .returning(|_| Ok(HashMap::new()));

        let bus = ProgressBus::new(Arc::new(store));
        assert!(bus.snapshot("j-1").await.unwrap().is_none());
    }
}
