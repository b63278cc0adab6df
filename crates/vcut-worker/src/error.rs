//! Worker error types.

use thiserror::Error;

use vcut_media::MediaError;
use vcut_models::{JobId, StageKind};

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Why a job's pipeline stopped. Every variant is terminal for the job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not prepare workspace for job {job_id}: {source}")]
    Workspace {
        job_id: JobId,
        #[source]
        source: std::io::Error,
    },

    #[error("Download failed for job {job_id}: {source}")]
    Download {
        job_id: JobId,
        #[source]
        source: MediaError,
    },

    #[error("Stage {kind} failed for job {job_id}: {source}")]
    Stage {
        kind: StageKind,
        job_id: JobId,
        #[source]
        source: MediaError,
    },
}

impl PipelineError {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Workspace { job_id, .. } | Self::Download { job_id, .. } | Self::Stage { job_id, .. } => job_id,
        }
    }

    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Workspace { .. } => "workspace",
            Self::Download { .. } => "download",
            Self::Stage { kind, .. } => kind.as_str(),
        }
    }
}

/// Delivering results to the backend failed. The pipeline output stands.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Cannot read artifact {path}: {source}")]
    Artifact {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failure report not delivered: {0}")]
    FailureChannel(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vcut_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_carries_context() {
        let err = PipelineError::Stage {
            kind: StageKind::Trim,
            job_id: JobId::from("v1"),
            source: MediaError::ffmpeg_failed("exit 1", None, Some(1)),
        };
        assert_eq!(err.job_id().as_str(), "v1");
        assert_eq!(err.kind(), "trim");
        assert!(err.to_string().contains("Stage trim failed for job v1"));
    }

    #[test]
    fn test_download_error_kind() {
        let err = PipelineError::Download {
            job_id: JobId::from("v2"),
            source: MediaError::download_failed("HTTP 404"),
        };
        assert_eq!(err.kind(), "download");
    }
}
