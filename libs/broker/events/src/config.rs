use core_config::{env_or_default, ConfigError, FromEnv};

/// Broadcaster tuning (§4.10, §6.6).
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    pub max_message_bytes: usize,
    pub chunk_bytes: usize,
    pub stats_interval_ms: u64,
    pub connection_timeout_ms: u64,
    /// Bounded per-socket outgoing queue; overflow closes the socket (§4.10
    /// "Backpressure").
    pub socket_queue_capacity: usize,
}

impl BroadcasterConfig {
    pub fn with_stats_interval_ms(mut self, ms: u64) -> Self {
        self.stats_interval_ms = ms;
        self
    }

    pub fn with_chunk_bytes(mut self, bytes: usize) -> Self {
        self.chunk_bytes = bytes;
        self
    }
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 100 * 1024 * 1024,
            chunk_bytes: 1024 * 1024,
            stats_interval_ms: 5_000,
            connection_timeout_ms: 60_000,
            socket_queue_capacity: 256,
        }
    }
}

impl FromEnv for BroadcasterConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let parse_usize = |key: &'static str, default: &str| -> Result<usize, ConfigError> {
            env_or_default(key, default)
                .parse()
                .map_err(|e| ConfigError::ParseError {
                    key: key.to_string(),
                    details: format!("{e}"),
                })
        };
        let parse_u64 = |key: &'static str, default: &str| -> Result<u64, ConfigError> {
            env_or_default(key, default)
                .parse()
                .map_err(|e| ConfigError::ParseError {
                    key: key.to_string(),
                    details: format!("{e}"),
                })
        };

        Ok(Self {
            max_message_bytes: parse_usize("BROADCASTER_MAX_MESSAGE_BYTES", &(100 * 1024 * 1024).to_string())?,
            chunk_bytes: parse_usize("BROADCASTER_CHUNK_BYTES", &(1024 * 1024).to_string())?,
            stats_interval_ms: parse_u64("BROADCASTER_STATS_INTERVAL_MS", "5000")?,
            connection_timeout_ms: parse_u64("BROADCASTER_CONNECTION_TIMEOUT_MS", "60000")?,
            socket_queue_capacity: parse_usize("BROADCASTER_SOCKET_QUEUE_CAPACITY", "256")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = BroadcasterConfig::default();
        assert_eq!(config.max_message_bytes, 100 * 1024 * 1024);
        assert_eq!(config.chunk_bytes, 1024 * 1024);
        assert_eq!(config.stats_interval_ms, 5_000);
        assert_eq!(config.connection_timeout_ms, 60_000);
    }
}
