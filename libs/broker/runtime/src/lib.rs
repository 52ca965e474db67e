//! The per-worker runtime loop (§4.8): polls the broker for claims, dispatches each
//! one to a [`broker_connector::Connector`], and reports outcome and progress back
//! through `broker-core`. This is the only crate in the workspace that owns a
//! `tokio` task lifecycle for a worker process.

mod config;
mod runtime;

pub use config::WorkerRuntimeConfig;
pub use runtime::WorkerRuntime;
