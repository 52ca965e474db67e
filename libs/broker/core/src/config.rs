use core_config::{env_or_default, ConfigError, FromEnv};

/// Submit-path defaults and the claim protocol's matching mode (§4.5, §6.6).
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub default_priority: u8,
    pub default_max_retries: u32,
    /// `broker.strict_matching` (§9): when `false` (the default, Phase-1A), the
    /// capability filter is skipped and any worker may claim any pending job.
    pub strict_matching: bool,
    /// Top-K candidates read from the pending set per claim attempt; K=1 when
    /// permissive, K=20 when strict filtering is enabled (§4.4).
    pub claim_candidates: usize,
}

impl BrokerConfig {
    pub fn with_strict_matching(mut self, strict: bool) -> Self {
        self.strict_matching = strict;
        self.claim_candidates = if strict { 20 } else { 1 };
        self
    }

    pub fn with_default_priority(mut self, priority: u8) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_priority: 50,
            default_max_retries: 3,
            strict_matching: false,
            claim_candidates: 1,
        }
    }
}

impl FromEnv for BrokerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let default_priority = env_or_default("BROKER_DEFAULT_PRIORITY", "50")
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "BROKER_DEFAULT_PRIORITY".to_string(),
                details: format!("{e}"),
            })?;
        let default_max_retries = env_or_default("BROKER_DEFAULT_MAX_RETRIES", "3")
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "BROKER_DEFAULT_MAX_RETRIES".to_string(),
                details: format!("{e}"),
            })?;
        let strict_matching = env_or_default("BROKER_STRICT_MATCHING", "false")
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "BROKER_STRICT_MATCHING".to_string(),
                details: format!("{e}"),
            })?;

        Ok(Self::default()
            .with_default_priority(default_priority)
            .with_default_max_retries(default_max_retries)
            .with_strict_matching(strict_matching))
    }
}

/// Reclaimer sweep timing (§4.7, §6.6).
#[derive(Debug, Clone)]
pub struct ReclaimerConfig {
    pub scan_interval_s: u64,
    pub heartbeat_timeout_s: u64,
    pub progress_timeout_s: u64,
}

impl ReclaimerConfig {
    pub fn with_scan_interval_s(mut self, secs: u64) -> Self {
        self.scan_interval_s = secs;
        self
    }

    pub fn with_heartbeat_timeout_s(mut self, secs: u64) -> Self {
        self.heartbeat_timeout_s = secs;
        self
    }

    pub fn with_progress_timeout_s(mut self, secs: u64) -> Self {
        self.progress_timeout_s = secs;
        self
    }
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            scan_interval_s: 60,
            heartbeat_timeout_s: 120,
            progress_timeout_s: 300,
        }
    }
}

impl FromEnv for ReclaimerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let parse = |key: &'static str, default: &str| -> Result<u64, ConfigError> {
            env_or_default(key, default)
                .parse()
                .map_err(|e| ConfigError::ParseError {
                    key: key.to_string(),
                    details: format!("{e}"),
                })
        };

        Ok(Self {
            scan_interval_s: parse("RECLAIMER_SCAN_INTERVAL_S", "60")?,
            heartbeat_timeout_s: parse("RECLAIMER_HEARTBEAT_TIMEOUT_S", "120")?,
            progress_timeout_s: parse("RECLAIMER_PROGRESS_TIMEOUT_S", "300")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let broker = BrokerConfig::default();
        assert_eq!(broker.default_priority, 50);
        assert_eq!(broker.default_max_retries, 3);
        assert!(!broker.strict_matching);
        assert_eq!(broker.claim_candidates, 1);

        let reclaimer = ReclaimerConfig::default();
        assert_eq!(reclaimer.scan_interval_s, 60);
        assert_eq!(reclaimer.heartbeat_timeout_s, 120);
        assert_eq!(reclaimer.progress_timeout_s, 300);
    }

    #[test]
    fn strict_matching_widens_candidate_window() {
        let config = BrokerConfig::default().with_strict_matching(true);
        assert_eq!(config.claim_candidates, 20);
    }

    #[test]
    fn from_env_reads_overrides() {
        temp_env::with_vars(
            [
                ("BROKER_DEFAULT_PRIORITY", Some("75")),
                ("BROKER_STRICT_MATCHING", Some("true")),
            ],
            || {
                let config = BrokerConfig::from_env().unwrap();
                assert_eq!(config.default_priority, 75);
                assert!(config.strict_matching);
                assert_eq!(config.claim_candidates, 20);
            },
        );
    }
}
