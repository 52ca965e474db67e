//! A deterministic in-memory [`Connector`] for integration tests and local demos.
//! Not a production connector — it never touches a GPU, a model, or the network.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use tracing::instrument;

use crate::connector::{Connector, ConnectorJob, ProgressSink, ProgressUpdate};
use crate::error::{ConnectorError, ConnectorResult};

/// Configures the latency/failure injection `SimConnector` uses to exercise the
/// broker's retry and reclaim paths without a real backend.
#[derive(Debug, Clone)]
pub struct SimConnectorConfig {
    pub step_delay: Duration,
    pub steps: u8,
    /// Fraction in `[0.0, 1.0]` of jobs that fail instead of completing.
    pub failure_rate: f64,
    pub models: Vec<String>,
}

impl Default for SimConnectorConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(50),
            steps: 5,
            failure_rate: 0.0,
            models: vec!["sim-model-a".to_string(), "sim-model-b".to_string()],
        }
    }
}

impl SimConnectorConfig {
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

/// Reports progress in even steps, sleeping `step_delay` between each, and either
/// completes with an echo of the payload or fails, per `failure_rate`.
pub struct SimConnector {
    config: SimConnectorConfig,
    cancelled: Mutex<HashSet<String>>,
}

impl SimConnector {
    pub fn new(config: SimConnectorConfig) -> Self {
        Self {
            config,
            cancelled: Mutex::new(HashSet::new()),
        }
    }

    fn is_cancelled(&self, job_id: &str) -> bool {
        self.cancelled.lock().expect("cancelled set poisoned").contains(job_id)
    }
}

impl Default for SimConnector {
    fn default() -> Self {
        Self::new(SimConnectorConfig::default())
    }
}

#[async_trait]
impl Connector for SimConnector {
    #[instrument(skip(self, job, progress), fields(job_id = %job.id))]
    async fn process_job(&self, job: ConnectorJob, progress: ProgressSink) -> ConnectorResult<serde_json::Value> {
        let steps = self.config.steps.max(1);

        for step in 1..=steps {
            if self.is_cancelled(&job.id) {
                return Err(ConnectorError::Cancelled);
            }
            tokio::time::sleep(self.config.step_delay).await;

            let pct = (u32::from(step) * 100 / u32::from(steps)) as u8;
            progress.report(
                ProgressUpdate::new(pct)
                    .with_message(format!("simulated step {step}/{steps}")),
            );
        }

        if self.is_cancelled(&job.id) {
            return Err(ConnectorError::Cancelled);
        }

        let fails = self.config.failure_rate > 0.0
            && rand::rng().random::<f64>() < self.config.failure_rate;
        if fails {
            return Err(ConnectorError::Rejected {
                connector: "sim".to_string(),
                job_id: job.id,
                message: "simulated failure".to_string(),
                retryable: true,
            });
        }

        Ok(json!({
            "service_type": job.service_type,
            "echo": job.payload,
        }))
    }

    async fn cancel_job(&self, job_id: &str) -> ConnectorResult<()> {
        self.cancelled
            .lock()
            .expect("cancelled set poisoned")
            .insert(job_id.to_string());
        Ok(())
    }

    async fn available_models(&self) -> ConnectorResult<Vec<String>> {
        Ok(self.config.models.clone())
    }

    async fn health(&self) -> bool {
        true
    }
}
