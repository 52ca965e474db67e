//! Error types shared by the connector/runtime layer.
//!
//! This module provides:
//! - `WorkerError` - the error type surfaced by connectors and the worker runtime
//! - `ErrorCategory` - classification of errors for smart retry logic
//! - `RetryStrategy` - how to handle retries based on error category

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while a worker talks to its store or connector.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Redis connection or command error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job processing error from the connector.
    #[error("Processing error: {0}")]
    Processing(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store operation error (claim, heartbeat, progress write, ...).
    #[error("Store error: {0}")]
    Store(String),

    /// Job payload could not be parsed.
    #[error("Job parsing error: {0}")]
    JobParsing(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Health check failed.
    #[error("Health check failed: {0}")]
    HealthCheck(String),

    /// Timeout error.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl WorkerError {
    /// Check if this is a connection-related error that might be recoverable.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Redis(e) => {
                let err_str = e.to_string().to_lowercase();
                err_str.contains("connection")
                    || err_str.contains("disconnected")
                    || err_str.contains("broken pipe")
                    || err_str.contains("reset by peer")
                    || err_str.contains("refused")
                    || err_str.contains("eof")
                    || err_str.contains("io error")
            }
            Self::Store(s) | Self::Internal(s) => {
                let lower = s.to_lowercase();
                lower.contains("connection")
            }
            _ => false,
        }
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Redis(e) => {
                let err_str = e.to_string().to_lowercase();
                err_str.contains("timeout") || err_str.contains("timed out")
            }
            Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Categorize the error for smart retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Redis(e) => {
                let err_str = e.to_string().to_lowercase();
                if err_str.contains("connection")
                    || err_str.contains("disconnected")
                    || err_str.contains("broken pipe")
                    || err_str.contains("reset by peer")
                    || err_str.contains("refused")
                    || err_str.contains("eof")
                    || err_str.contains("io error")
                    || err_str.contains("timeout")
                    || err_str.contains("timed out")
                {
                    ErrorCategory::Transient
                } else if err_str.contains("busy") || err_str.contains("loading") {
                    ErrorCategory::RateLimited
                } else {
                    ErrorCategory::Transient
                }
            }

            Self::Store(s) | Self::Internal(s) => {
                let lower = s.to_lowercase();
                if lower.contains("connection") || lower.contains("timeout") {
                    ErrorCategory::Transient
                } else if lower.contains("rate") || lower.contains("limit") || lower.contains("quota")
                {
                    ErrorCategory::RateLimited
                } else {
                    ErrorCategory::Transient
                }
            }

            Self::Timeout(_) => ErrorCategory::Transient,
            Self::HealthCheck(_) => ErrorCategory::Transient,

            // Serialization/parsing errors are permanent - bad data, don't retry
            Self::Serialization(_) => ErrorCategory::Permanent,
            Self::JobParsing(_) => ErrorCategory::Permanent,
            Self::Config(_) => ErrorCategory::Permanent,

            Self::Processing(s) => {
                let lower = s.to_lowercase();
                if lower.contains("rate")
                    || lower.contains("limit")
                    || lower.contains("quota")
                    || lower.contains("throttl")
                    || lower.contains("429")
                    || lower.contains("too many")
                {
                    ErrorCategory::RateLimited
                } else if lower.contains("invalid")
                    || lower.contains("malformed")
                    || lower.contains("not found")
                    || lower.contains("does not exist")
                    || lower.contains("forbidden")
                    || lower.contains("unauthorized")
                    || lower.contains("401")
                    || lower.contains("403")
                    || lower.contains("404")
                {
                    ErrorCategory::Permanent
                } else if lower.contains("timeout")
                    || lower.contains("connection")
                    || lower.contains("temporarily")
                    || lower.contains("unavailable")
                    || lower.contains("500")
                    || lower.contains("502")
                    || lower.contains("503")
                    || lower.contains("504")
                {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Transient
                }
            }
        }
    }
}

/// Error category for smart retry logic.
///
/// - `Transient`: temporary issues that will likely resolve with retry (connection issues, timeouts)
/// - `Permanent`: errors that won't be fixed by retrying (invalid data, auth failures)
/// - `RateLimited`: upstream service is overloaded, needs longer backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    Permanent,
    RateLimited,
}

impl ErrorCategory {
    /// Get the default retry strategy for this error category.
    pub fn retry_strategy(&self) -> RetryStrategy {
        match self {
            Self::Transient => RetryStrategy::ExponentialBackoff {
                base_delay_ms: 1000,
                max_delay_ms: 30_000,
                max_retries: 3,
            },
            Self::Permanent => RetryStrategy::NoRetry,
            Self::RateLimited => RetryStrategy::ExponentialBackoff {
                base_delay_ms: 5000,
                max_delay_ms: 120_000,
                max_retries: 5,
            },
        }
    }

    pub fn should_retry(&self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

/// Retry strategy for handling errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Do not retry, move straight to the failed archive.
    NoRetry,

    /// Retry with exponential backoff.
    ExponentialBackoff {
        base_delay_ms: u64,
        max_delay_ms: u64,
        max_retries: u32,
    },
}

impl RetryStrategy {
    /// Calculate the delay for a given retry attempt, or `None` if retries are exhausted.
    ///
    /// Uses exponential backoff with jitter to prevent thundering herd.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::NoRetry => None,
            Self::ExponentialBackoff {
                base_delay_ms,
                max_delay_ms,
                max_retries,
            } => {
                if attempt >= *max_retries {
                    return None;
                }

                let exp_delay = base_delay_ms.saturating_mul(2u64.pow(attempt));
                let capped_delay = exp_delay.min(*max_delay_ms);
                let final_delay = Self::apply_jitter(capped_delay);

                Some(Duration::from_millis(final_delay))
            }
        }
    }

    /// Apply jitter to a delay (±25% randomness).
    fn apply_jitter(delay_ms: u64) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        use std::time::SystemTime;

        let mut hasher = DefaultHasher::new();
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .hash(&mut hasher);
        let hash = hasher.finish();

        let jitter_range = delay_ms / 4;
        if jitter_range == 0 {
            return delay_ms;
        }

        let random_offset = (hash % (jitter_range * 2 + 1)) as i64 - jitter_range as i64;

        if random_offset < 0 {
            delay_ms.saturating_sub((-random_offset) as u64)
        } else {
            delay_ms.saturating_add(random_offset as u64)
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        match self {
            Self::NoRetry => false,
            Self::ExponentialBackoff { max_retries, .. } => attempt < *max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            Self::NoRetry => 0,
            Self::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkerError::Processing("failed to render frame".to_string());
        assert_eq!(err.to_string(), "Processing error: failed to render frame");
    }

    #[test]
    fn test_is_connection_error() {
        let err = WorkerError::Store("connection refused".to_string());
        assert!(err.is_connection_error());

        let err = WorkerError::Processing("invalid data".to_string());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_error_category_transient() {
        let err = WorkerError::Timeout("operation timed out".to_string());
        assert_eq!(err.category(), ErrorCategory::Transient);

        let err = WorkerError::Store("connection reset".to_string());
        assert_eq!(err.category(), ErrorCategory::Transient);

        let err = WorkerError::Processing("503 service unavailable".to_string());
        assert_eq!(err.category(), ErrorCategory::Transient);
    }

    #[test]
    fn test_error_category_permanent() {
        let err = WorkerError::JobParsing("invalid json".to_string());
        assert_eq!(err.category(), ErrorCategory::Permanent);

        let err = WorkerError::Config("missing required field".to_string());
        assert_eq!(err.category(), ErrorCategory::Permanent);

        let err = WorkerError::Processing("404 not found".to_string());
        assert_eq!(err.category(), ErrorCategory::Permanent);

        let err = WorkerError::Processing("unauthorized access".to_string());
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn test_error_category_rate_limited() {
        let err = WorkerError::Processing("429 too many requests".to_string());
        assert_eq!(err.category(), ErrorCategory::RateLimited);

        let err = WorkerError::Processing("rate limit exceeded".to_string());
        assert_eq!(err.category(), ErrorCategory::RateLimited);

        let err = WorkerError::Store("quota exceeded".to_string());
        assert_eq!(err.category(), ErrorCategory::RateLimited);
    }

    #[test]
    fn test_retry_strategy_no_retry() {
        let strategy = RetryStrategy::NoRetry;
        assert!(!strategy.should_retry(0));
        assert_eq!(strategy.delay_for_attempt(0), None);
        assert_eq!(strategy.max_retries(), 0);
    }

    #[test]
    fn test_retry_strategy_exponential_backoff() {
        let strategy = RetryStrategy::ExponentialBackoff {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_retries: 3,
        };

        assert!(strategy.should_retry(0));
        assert!(strategy.should_retry(1));
        assert!(strategy.should_retry(2));
        assert!(!strategy.should_retry(3));

        assert!(strategy.delay_for_attempt(0).is_some());
        assert!(strategy.delay_for_attempt(2).is_some());
        assert!(strategy.delay_for_attempt(3).is_none());

        assert_eq!(strategy.max_retries(), 3);
    }

    #[test]
    fn test_retry_strategy_delay_capping() {
        let strategy = RetryStrategy::ExponentialBackoff {
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            max_retries: 10,
        };

        let delay = strategy.delay_for_attempt(8).unwrap();
        assert!(delay.as_millis() <= 7000);
    }

    #[test]
    fn test_error_category_should_retry() {
        assert!(ErrorCategory::Transient.should_retry());
        assert!(!ErrorCategory::Permanent.should_retry());
        assert!(ErrorCategory::RateLimited.should_retry());
    }

    #[test]
    fn test_error_category_retry_strategy() {
        let strategy = ErrorCategory::Transient.retry_strategy();
        assert!(matches!(
            strategy,
            RetryStrategy::ExponentialBackoff { max_retries: 3, .. }
        ));

        let strategy = ErrorCategory::Permanent.retry_strategy();
        assert!(matches!(strategy, RetryStrategy::NoRetry));

        let strategy = ErrorCategory::RateLimited.retry_strategy();
        assert!(matches!(
            strategy,
            RetryStrategy::ExponentialBackoff { max_retries: 5, .. }
        ));
    }
}
