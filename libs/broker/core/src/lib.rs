//! Job lifecycle, worker registry, the pull-side claim protocol, the reclaimer, and
//! the progress bus — everything in §4 except the connector contract, the wire
//! broadcasters, and the per-worker runtime loop, which live in their own crates so
//! `broker-core` stays store-and-model-only with no transport dependencies.

pub mod broker;
pub mod config;
pub mod error;
pub mod events;
pub mod job_repository;
pub mod keys;
pub mod progress_bus;
pub mod reclaimer;
pub mod serialize;
pub mod worker_registry;

pub use broker::Broker;
pub use config::{BrokerConfig, ReclaimerConfig};
pub use error::{BrokerError, BrokerResult};
pub use events::BrokerEvent;
pub use job_repository::{JobQuery, JobRepository, QueueStats};
pub use progress_bus::ProgressBus;
pub use reclaimer::{Reclaimer, SweepReport};
pub use worker_registry::WorkerRegistry;
