use core_config::{env_or_default, ConfigError, FromEnv};

/// Poll-loop timing and per-job limits for [`crate::WorkerRuntime`] (§4.8, §6.6).
#[derive(Debug, Clone)]
pub struct WorkerRuntimeConfig {
    pub poll_interval_ms: u64,
    pub max_concurrent_jobs: usize,
    pub job_timeout_minutes: u64,
    pub heartbeat_interval_ms: u64,
    /// TTL set on the worker's heartbeat key; should comfortably exceed
    /// `heartbeat_interval_ms` so a slow tick doesn't make the Reclaimer think this
    /// worker died (§4.7).
    pub heartbeat_ttl_secs: i64,
}

impl WorkerRuntimeConfig {
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_job_timeout_minutes(mut self, minutes: u64) -> Self {
        self.job_timeout_minutes = minutes;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }
}

impl Default for WorkerRuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_concurrent_jobs: 1,
            job_timeout_minutes: 30,
            heartbeat_interval_ms: 30_000,
            heartbeat_ttl_secs: 120,
        }
    }
}

impl FromEnv for WorkerRuntimeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let parse_u64 = |key: &'static str, default: &str| -> Result<u64, ConfigError> {
            env_or_default(key, default)
                .parse()
                .map_err(|e| ConfigError::ParseError {
                    key: key.to_string(),
                    details: format!("{e}"),
                })
        };
        let parse_i64 = |key: &'static str, default: &str| -> Result<i64, ConfigError> {
            env_or_default(key, default)
                .parse()
                .map_err(|e| ConfigError::ParseError {
                    key: key.to_string(),
                    details: format!("{e}"),
                })
        };

        let max_concurrent_jobs = parse_u64("WORKER_MAX_CONCURRENT_JOBS", "1")? as usize;

        Ok(Self {
            poll_interval_ms: parse_u64("WORKER_POLL_INTERVAL_MS", "1000")?,
            max_concurrent_jobs: max_concurrent_jobs.max(1),
            job_timeout_minutes: parse_u64("WORKER_JOB_TIMEOUT_MINUTES", "30")?,
            heartbeat_interval_ms: parse_u64("WORKER_HEARTBEAT_INTERVAL_MS", "30000")?,
            heartbeat_ttl_secs: parse_i64("WORKER_HEARTBEAT_TTL_SECS", "120")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = WorkerRuntimeConfig::default();
        assert_eq!(config.poll_interval_ms, 1_000);
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.job_timeout_minutes, 30);
        assert_eq!(config.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn max_concurrent_jobs_floors_at_one() {
        let config = WorkerRuntimeConfig::default().with_max_concurrent_jobs(0);
        assert_eq!(config.max_concurrent_jobs, 1);
    }
}
