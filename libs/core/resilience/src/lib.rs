//! Resilience primitives shared by connectors and the worker runtime.
//!
//! - Smart error categorization (transient, permanent, rate-limited) with
//!   matching retry/backoff strategies
//! - Circuit breaker for cascading-failure protection per connector
//! - Token-bucket rate limiter for outbound calls to external services
//! - Metric names and recording helpers for job throughput and errors
//!
//! # Example
//!
//! ```rust,ignore
//! use broker_resilience::{ResilienceLayer, WorkerError};
//!
//! let resilience = ResilienceLayer::new(Default::default(), None);
//! resilience.check()?;
//! match connector.dispatch(&job).await {
//!     Ok(_) => resilience.record_success(),
//!     Err(e) => {
//!         resilience.record_failure();
//!         let strategy = e.category().retry_strategy();
//!     }
//! }
//! ```

mod error;
pub mod metrics;
pub mod resilience;

pub use error::{ErrorCategory, RetryStrategy, WorkerError};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter, ResilienceError,
    ResilienceLayer,
};

/// Result type alias for worker/connector operations.
pub type WorkerResult<T> = Result<T, WorkerError>;
