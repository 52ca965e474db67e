//! Connection management and retry utilities backing the job store.
//!
//! # Features
//!
//! - `redis` (default) - Redis connection management
//! - `config` - Configuration support via `core_config::FromEnv`
//!
//! # Examples
//!
//! ```ignore
//! use database::redis;
//!
//! let conn = redis::connect("redis://127.0.0.1:6379").await?;
//! ```

// Always available modules
pub mod common;

#[cfg(feature = "redis")]
pub mod redis;

// Re-exports for convenience
pub use common::{DatabaseError, DatabaseResult};
