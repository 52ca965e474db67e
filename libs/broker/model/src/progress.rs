use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One point in a job's progress stream (`progress:<jobId>`, §6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Assigned,
    Processing,
    Completed,
    Failed,
    Retrying,
}

/// An append-only progress entry (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
    pub job_id: String,
    pub worker_id: String,
    pub progress: u8,
    pub status: ProgressStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub current_step: Option<u32>,
    #[serde(default)]
    pub total_steps: Option<u32>,
    pub updated_at: i64,
}

impl ProgressRecord {
    pub fn new(
        job_id: impl Into<String>,
        worker_id: impl Into<String>,
        progress: u8,
        status: ProgressStatus,
        now_ms: i64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            worker_id: worker_id.into(),
            progress: progress.min(100),
            status,
            message: None,
            current_step: None,
            total_steps: None,
            updated_at: now_ms,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_step(mut self, current_step: u32, total_steps: u32) -> Self {
        self.current_step = Some(current_step);
        self.total_steps = Some(total_steps);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_clamped_to_100() {
        let record = ProgressRecord::new("j-1", "w-1", 250, ProgressStatus::Processing, 0);
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn builder_methods_set_optional_fields() {
        let record = ProgressRecord::new("j-1", "w-1", 40, ProgressStatus::Processing, 0)
            .with_message("halfway")
            .with_step(2, 5);
        assert_eq!(record.message.as_deref(), Some("halfway"));
        assert_eq!(record.current_step, Some(2));
        assert_eq!(record.total_steps, Some(5));
    }
}
