//! Per-job processing: plan, execute, deliver.

use tracing::Instrument;

use vcut_models::{JobId, JobSettings, JobState};

use crate::logging::JobLogger;
use crate::metrics;
use crate::notifier::{JobOutcome, ResultNotifier};
use crate::pipeline::PipelineExecutor;
use crate::planner::{plan, MergePolicy};

/// Runs one job from validated settings to its terminal state.
#[derive(Clone)]
pub struct JobProcessor {
    pipeline: PipelineExecutor,
    notifier: ResultNotifier,
    merge_policy: MergePolicy,
}

impl JobProcessor {
    pub fn new(pipeline: PipelineExecutor, notifier: ResultNotifier, merge_policy: MergePolicy) -> Self {
        Self {
            pipeline,
            notifier,
            merge_policy,
        }
    }

    /// Process a job. Never fails: the outcome has already been reported to
    /// the backend when this returns.
    pub async fn process(&self, settings: &JobSettings) -> JobOutcome {
        let logger = JobLogger::new(&settings.id, "process_video");
        let span = logger.create_span();

        async {
            metrics::record_job_started();
            logger.log_state(JobState::Received);

            let plan = plan(settings, self.merge_policy);
            logger.log_start(&format!(
                "{} ({}), plan {} [{}]",
                settings.video_name,
                settings.url,
                plan,
                self.merge_policy.as_str()
            ));

            let outcome = match self
                .pipeline
                .execute(&settings.id, &settings.url, &settings.video_name, &plan)
                .await
            {
                Ok(output) => {
                    logger.log_state(JobState::Uploading);
                    let outcome = self.notifier.notify(&settings.id, &Ok(output.artifacts.clone())).await;
                    output.workspace.close();
                    if outcome == JobOutcome::Failed {
                        metrics::record_job_failed("upload");
                    }
                    outcome
                }
                Err(e) => {
                    logger.log_error(&e.to_string());
                    metrics::record_job_failed(e.kind());
                    self.notifier.notify(&settings.id, &Err(e)).await
                }
            };

            match outcome {
                JobOutcome::Delivered => {
                    metrics::record_job_completed();
                    logger.log_state(JobState::Done);
                    logger.log_completion("results delivered");
                }
                JobOutcome::Failed => logger.log_state(JobState::Failed),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Report a payload that could not become a job.
    pub async fn reject(&self, job_id: Option<&JobId>, reason: &str) {
        metrics::record_payload_rejected();
        match job_id {
            Some(job_id) => {
                JobLogger::new(job_id, "intake").log_error(&format!("rejected payload: {}", reason));
                self.notifier.report_failure(job_id).await;
            }
            None => tracing::warn!("Dropping payload without a readable _id: {}", reason),
        }
    }

    /// Report a job that was dead-lettered after exhausting its deliveries.
    pub async fn abandon(&self, job_id: Option<&JobId>, reason: &str) {
        metrics::record_job_failed("abandoned");
        match job_id {
            Some(job_id) => {
                let logger = JobLogger::new(job_id, "recovery");
                logger.log_state(JobState::Failed);
                logger.log_error(reason);
                self.notifier.report_failure(job_id).await;
            }
            None => tracing::warn!("Dead-lettered a payload without a readable _id: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use vcut_models::{Rotation, StageKind, TrimMode, TrimSegment};

    use crate::notifier::tests::{RecordingFailures, RecordingUploader};
    use crate::pipeline::tests::{FakeEngine, RecordingReporter};

    struct Harness {
        engine: Arc<FakeEngine>,
        reporter: Arc<RecordingReporter>,
        uploader: Arc<RecordingUploader>,
        failures: Arc<RecordingFailures>,
        root: TempDir,
        processor: JobProcessor,
    }

    fn harness(engine: FakeEngine) -> Harness {
        let engine = Arc::new(engine);
        let reporter = Arc::new(RecordingReporter::default());
        let uploader = Arc::new(RecordingUploader::default());
        let failures = Arc::new(RecordingFailures::default());
        let root = TempDir::new().unwrap();
        let processor = JobProcessor::new(
            PipelineExecutor::new(engine.clone(), reporter.clone(), root.path()),
            ResultNotifier::new(uploader.clone(), failures.clone()),
            MergePolicy::Fold,
        );
        Harness {
            engine,
            reporter,
            uploader,
            failures,
            root,
            processor,
        }
    }

    fn settings() -> JobSettings {
        JobSettings::new("v1", "https://upload.wikimedia.org/a.webm").with_video_name("a.webm")
    }

    fn trimmed() -> JobSettings {
        settings()
            .with_trims(
                vec![TrimSegment::new(0.0, 5.0), TrimSegment::new(10.0, 15.0)],
                TrimMode::Single,
            )
            .with_audio_disabled()
    }

    fn root_is_empty(h: &Harness) -> bool {
        std::fs::read_dir(h.root.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_plain_job_uploads_one_artifact() {
        let h = harness(FakeEngine::default());

        let outcome = h.processor.process(&settings()).await;

        assert_eq!(outcome, JobOutcome::Delivered);
        assert_eq!(h.reporter.stages(), vec!["downloading"]);
        let uploads = h.uploader.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1.len(), 1);
        assert!(h.failures.failed.lock().unwrap().is_empty());
        assert!(root_is_empty(&h));
    }

    #[tokio::test]
    async fn test_trimmed_job_uploads_joined_artifact() {
        let h = harness(FakeEngine::default());

        let outcome = h.processor.process(&trimmed()).await;

        assert_eq!(outcome, JobOutcome::Delivered);
        assert_eq!(h.reporter.stages(), vec!["downloading", "trimming", "concating"]);
        assert_eq!(h.uploader.uploads.lock().unwrap()[0].1.len(), 1);
    }

    #[tokio::test]
    async fn test_trim_failure_reports_without_upload() {
        let h = harness(FakeEngine::failing_on(StageKind::Trim));

        let outcome = h.processor.process(&trimmed()).await;

        assert_eq!(outcome, JobOutcome::Failed);
        assert_eq!(h.engine.kinds(), vec![StageKind::Trim]);
        assert!(h.uploader.uploads.lock().unwrap().is_empty());
        assert_eq!(*h.failures.failed.lock().unwrap(), vec![JobId::from("v1")]);
        assert!(root_is_empty(&h));
    }

    #[tokio::test]
    async fn test_rotated_job() {
        let h = harness(FakeEngine::default());

        h.processor
            .process(&settings().with_rotation(Rotation::Clockwise90))
            .await;

        assert_eq!(h.engine.kinds(), vec![StageKind::Manipulate, StageKind::Convert]);
    }

    #[tokio::test]
    async fn test_upload_failure_is_reported_once() {
        let h = harness(FakeEngine::default());
        let processor = JobProcessor::new(
            PipelineExecutor::new(h.engine.clone(), h.reporter.clone(), h.root.path()),
            ResultNotifier::new(
                Arc::new(RecordingUploader {
                    reject: true,
                    ..Default::default()
                }),
                h.failures.clone(),
            ),
            MergePolicy::Fold,
        );

        let outcome = processor.process(&settings()).await;

        assert_eq!(outcome, JobOutcome::Failed);
        assert_eq!(h.failures.failed.lock().unwrap().len(), 1);
        assert!(root_is_empty(&h));
    }

    #[tokio::test]
    async fn test_reject_reports_known_ids_only() {
        let h = harness(FakeEngine::default());

        h.processor.reject(Some(&JobId::from("bad")), "trimVideo without trims").await;
        h.processor.reject(None, "not JSON").await;

        assert_eq!(*h.failures.failed.lock().unwrap(), vec![JobId::from("bad")]);
    }

    #[tokio::test]
    async fn test_abandon_reports_failure_without_running() {
        let h = harness(FakeEngine::default());

        h.processor
            .abandon(Some(&JobId::from("stuck")), "abandoned after 4 deliveries")
            .await;

        assert!(h.engine.kinds().is_empty());
        assert_eq!(*h.failures.failed.lock().unwrap(), vec![JobId::from("stuck")]);
    }
}
