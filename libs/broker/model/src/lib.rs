//! Shared data model for the job broker: jobs, workers, progress records, the
//! priority+FIFO scoring formula, and capability matching predicates.
//!
//! This crate is intentionally store-agnostic — it has no notion of Redis, hashes,
//! or streams. `broker-store` and `broker-core` serialize these types onto the
//! concrete persisted layout described in the system's key-layout table.

pub mod job;
pub mod matching;
pub mod progress;
pub mod scoring;
pub mod worker;

pub use job::{Job, JobPayload, JobRequirements, JobSpec, JobStatus};
pub use matching::is_eligible;
pub use progress::{ProgressRecord, ProgressStatus};
pub use scoring::{pending_score, score_for_job, MAX_SAFE_INT};
pub use worker::{Capabilities, CustomerIsolation, MatchSet, Worker, WorkerStatus, MATCH_ALL};
