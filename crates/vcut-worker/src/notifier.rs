//! Result delivery to the backend and failure reporting.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use vcut_media::delete_files;
use vcut_models::JobId;
use vcut_queue::FinishChannel;

use crate::error::{NotificationError, PipelineError};
use crate::metrics;

/// Form field carrying the job id.
pub const VIDEO_ID_FIELD: &str = "videoId";
/// Form field of each uploaded artifact.
pub const VIDEOS_FIELD: &str = "videos";

/// Uploads final artifacts in one request.
#[async_trait]
pub trait ResultUploader: Send + Sync {
    async fn upload(&self, job_id: &JobId, artifacts: &[PathBuf]) -> Result<(), NotificationError>;
}

/// Publishes `{success: false, videoId}`.
#[async_trait]
pub trait FailureReporter: Send + Sync {
    async fn report_failure(&self, job_id: &JobId) -> Result<(), NotificationError>;
}

#[async_trait]
impl FailureReporter for FinishChannel {
    async fn report_failure(&self, job_id: &JobId) -> Result<(), NotificationError> {
        self.failed(job_id)
            .await
            .map_err(|e| NotificationError::FailureChannel(e.to_string()))
    }
}

/// Multipart client for `POST {api_root}/video_processed`.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    endpoint: String,
}

impl BackendClient {
    pub fn new(api_root: &str, timeout: Duration) -> Result<Self, NotificationError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/video_processed", api_root.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn artifact_part(path: &Path) -> Result<Part, NotificationError> {
        let artifact_error = |source| NotificationError::Artifact {
            path: path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(artifact_error)?;
        let len = file.metadata().await.map_err(artifact_error)?.len();

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some("webm") => "video/webm",
            Some("mp4") => "video/mp4",
            _ => "application/octet-stream",
        };

        Ok(Part::stream_with_length(reqwest::Body::from(file), len)
            .file_name(file_name)
            .mime_str(mime)?)
    }
}

#[async_trait]
impl ResultUploader for BackendClient {
    async fn upload(&self, job_id: &JobId, artifacts: &[PathBuf]) -> Result<(), NotificationError> {
        let mut form = Form::new().text(VIDEO_ID_FIELD, job_id.to_string());
        for path in artifacts {
            form = form.part(VIDEOS_FIELD, Self::artifact_part(path).await?);
        }

        let response = self.http.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Terminal outcome of a job as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered,
    Failed,
}

/// Delivers pipeline results and reports failures.
#[derive(Clone)]
pub struct ResultNotifier {
    uploader: Arc<dyn ResultUploader>,
    failures: Arc<dyn FailureReporter>,
}

impl ResultNotifier {
    pub fn new(uploader: Arc<dyn ResultUploader>, failures: Arc<dyn FailureReporter>) -> Self {
        Self { uploader, failures }
    }

    /// Upload the artifacts of a finished pipeline, or report its failure.
    ///
    /// Artifacts are deleted after the upload attempt whatever its result.
    pub async fn notify(&self, job_id: &JobId, result: &Result<Vec<PathBuf>, PipelineError>) -> JobOutcome {
        match result {
            Ok(artifacts) => {
                let started = Instant::now();
                let upload = self.uploader.upload(job_id, artifacts).await;
                metrics::record_upload_duration(started.elapsed().as_secs_f64());
                delete_files(artifacts).await;

                match upload {
                    Ok(()) => {
                        info!(job_id = %job_id, artifacts = artifacts.len(), "Results delivered");
                        JobOutcome::Delivered
                    }
                    Err(e) => {
                        warn!(job_id = %job_id, "Result upload failed: {}", e);
                        self.report_failure(job_id).await;
                        JobOutcome::Failed
                    }
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, "Pipeline failed: {}", e);
                self.report_failure(job_id).await;
                JobOutcome::Failed
            }
        }
    }

    /// Emit the failure message once. Delivery problems are logged only.
    pub async fn report_failure(&self, job_id: &JobId) {
        if let Err(e) = self.failures.report_failure(job_id).await {
            error!(job_id = %job_id, "Failed to report job failure: {}", e);
        }
    }
}
