//! Per-job structured logging.
//!
//! Every event carries `job_id` and `operation` so one job can be followed
//! through the interleaved output of concurrent jobs.

use tracing::{error, info, warn, Span};
use vcut_models::{JobId, JobState};

/// Logger bound to one job and the operation acting on it (`intake`,
/// `pipeline`, `process_video`, `recovery`).
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job started: {}", message);
    }

    /// Lifecycle transition, with the state as a separate field for filtering.
    pub fn log_state(&self, state: JobState) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            state = state.as_str(),
            "Job state: {}", state
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "{}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, operation = self.operation, "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, operation = self.operation, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job finished: {}", message);
    }

    /// Span wrapping everything done for the job, so engine and queue
    /// events inherit the job id.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_carries_job_fields() {
        let logger = JobLogger::new(&JobId::from("5f1c2a"), "process_video");

        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let span = logger.create_span();
            let metadata = span.metadata().unwrap();
            assert_eq!(metadata.name(), "job");
            assert!(span.field("job_id").is_some());
            assert!(span.field("operation").is_some());
        });
    }
}
