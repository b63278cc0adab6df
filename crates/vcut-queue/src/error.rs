//! Queue error types.

use thiserror::Error;

use vcut_models::JobId;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The payload cannot become a job. `job_id` is set when the `_id`
    /// field was still readable.
    #[error("Invalid job payload: {reason}")]
    InvalidPayload {
        job_id: Option<JobId>,
        reason: String,
    },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn invalid_payload(job_id: Option<JobId>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            job_id,
            reason: reason.into(),
        }
    }

    /// Job id carried by an invalid payload, if any.
    pub fn payload_job_id(&self) -> Option<&JobId> {
        match self {
            Self::InvalidPayload { job_id, .. } => job_id.as_ref(),
            _ => None,
        }
    }
}
