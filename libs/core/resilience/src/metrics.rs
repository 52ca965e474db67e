//! Metrics recorded by connectors and the worker runtime.
//!
//! These record through whichever global recorder `observability::init_metrics`
//! installed; this module does not install its own.
//!
//! ## Available Metrics
//!
//! - `broker_jobs_processed_total` - Counter of jobs processed by outcome
//! - `broker_job_processing_duration_seconds` - Histogram of job processing time
//! - `broker_queue_depth` - Gauge of current queue depth
//! - `broker_errors_total` - Counter of errors by type
//! - `broker_retries_total` - Counter of retry attempts
//! - `broker_in_flight_jobs` - Gauge of concurrently processing jobs

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_PROCESSED: &str = "broker_jobs_processed_total";
    pub const JOB_DURATION: &str = "broker_job_processing_duration_seconds";
    pub const QUEUE_DEPTH: &str = "broker_queue_depth";
    pub const ERRORS: &str = "broker_errors_total";
    pub const RETRIES: &str = "broker_retries_total";
    pub const BATCH_SIZE: &str = "broker_batch_size";
    pub const FAILED_ARCHIVE_SIZE: &str = "broker_failed_archive_size";
    pub const IN_FLIGHT_JOBS: &str = "broker_in_flight_jobs";
}

/// Job processing outcome for metrics labeling.
#[derive(Debug, Clone, Copy)]
pub enum JobStatus {
    Success,
    Failed,
    Archived,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Archived => "archived",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Error category for metrics labeling.
#[derive(Debug, Clone, Copy)]
pub enum ErrorType {
    Transient,
    Permanent,
    RateLimited,
    Validation,
    Connection,
    Timeout,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::RateLimited => "rate_limited",
            Self::Validation => "validation",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

/// Record a job as processed with the given status, scoped to its job type.
pub fn record_job_processed(job_type: &str, status: JobStatus) {
    counter!(
        names::JOBS_PROCESSED,
        "job_type" => job_type.to_string(),
        "status" => status.as_str().to_string()
    )
    .increment(1);
}

/// Record job processing duration for a given job type.
pub fn record_job_duration(job_type: &str, operation: &str, duration: Duration) {
    histogram!(
        names::JOB_DURATION,
        "job_type" => job_type.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Update the pending-queue depth gauge for a job type.
pub fn set_queue_depth(job_type: &str, depth: f64) {
    gauge!(
        names::QUEUE_DEPTH,
        "job_type" => job_type.to_string()
    )
    .set(depth);
}

/// Record an error by type, scoped to a job type.
pub fn record_error(job_type: &str, error_type: ErrorType) {
    counter!(
        names::ERRORS,
        "job_type" => job_type.to_string(),
        "error_type" => error_type.as_str().to_string()
    )
    .increment(1);
}

/// Record a retry attempt.
pub fn record_retry(job_type: &str, attempt: u32) {
    counter!(
        names::RETRIES,
        "job_type" => job_type.to_string(),
        "attempt" => attempt.to_string()
    )
    .increment(1);
}

/// Record the batch size processed in a single poll.
pub fn record_batch_size(worker_id: &str, size: usize) {
    histogram!(
        names::BATCH_SIZE,
        "worker_id" => worker_id.to_string()
    )
    .record(size as f64);
}

/// Update the failed-archive size gauge.
pub fn set_failed_archive_size(size: f64) {
    gauge!(names::FAILED_ARCHIVE_SIZE).set(size);
}

/// Update the in-flight jobs gauge (concurrent processing).
pub fn set_in_flight_jobs(worker_id: &str, count: f64) {
    gauge!(
        names::IN_FLIGHT_JOBS,
        "worker_id" => worker_id.to_string()
    )
    .set(count);
}

/// Helper struct for timing operations and recording duration on drop.
pub struct MetricsTimer {
    job_type: String,
    operation: String,
    start: std::time::Instant,
}

impl MetricsTimer {
    pub fn new(job_type: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            operation: operation.into(),
            start: std::time::Instant::now(),
        }
    }

    /// Stop the timer and record the duration.
    pub fn stop(self) {
        let duration = self.start.elapsed();
        record_job_duration(&self.job_type, &self.operation, duration);
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        record_job_duration(&self.job_type, &self.operation, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_as_str() {
        assert_eq!(JobStatus::Success.as_str(), "success");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
        assert_eq!(JobStatus::Archived.as_str(), "archived");
        assert_eq!(JobStatus::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn test_error_type_as_str() {
        assert_eq!(ErrorType::Transient.as_str(), "transient");
        assert_eq!(ErrorType::RateLimited.as_str(), "rate_limited");
    }

    #[test]
    fn test_metrics_timer() {
        let timer = MetricsTimer::new("test_job_type", "test_op");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed().as_millis() >= 10);
    }
}
