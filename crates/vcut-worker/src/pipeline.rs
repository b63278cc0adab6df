//! Pipeline execution: run a planned job pass by pass.
//!
//! The executor owns the job's working state. After every pass the previous
//! artifact set is deleted, so at most one set is on disk outside of a
//! running pass. The job's workspace directory is removed on every exit path;
//! on success it travels with the output until results are delivered.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use vcut_media::{delete_files, MediaEngine, MediaError, MediaResult, StageContext, StageOutput};
use vcut_models::stage::DOWNLOADING_LABEL;
use vcut_models::{JobId, JobState, Plan, Stage, StageKind};

use crate::error::PipelineError;
use crate::logging::JobLogger;
use crate::metrics;
use crate::reporter::ProgressReporter;

/// Job-scoped artifact namespace, removed when dropped.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create a fresh directory under `root`, named after the job.
    pub fn create(root: &Path, job_id: &JobId) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id.namespace()))
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the workspace now, logging instead of failing.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove workspace {}: {}", path.display(), e);
        }
    }
}

/// Working state threaded through the passes of one job.
#[derive(Debug, Default)]
pub struct PipelineState {
    /// Current artifact set. More than one entry only between trim and concat.
    pub artifacts: Vec<PathBuf>,
    /// Output timeline consumed by prior passes. Never decreases.
    pub accumulated_timecode: Duration,
    /// Stage kinds that finished, for auditing.
    pub completed: BTreeSet<StageKind>,
}

impl PipelineState {
    fn advance_timecode(&mut self, reported: Option<Duration>, logger: &JobLogger) {
        match reported {
            Some(timecode) if timecode >= self.accumulated_timecode => {
                self.accumulated_timecode = timecode;
            }
            Some(timecode) => logger.log_warning(&format!(
                "ignoring timecode {:?} below accumulated {:?}",
                timecode, self.accumulated_timecode
            )),
            None => {}
        }
    }
}

/// Final artifacts of a successful run.
///
/// Holds the workspace so the artifacts stay on disk until delivery.
#[derive(Debug)]
pub struct PipelineOutput {
    pub artifacts: Vec<PathBuf>,
    pub state: PipelineState,
    pub workspace: JobWorkspace,
}

/// Runs plans against a media engine.
#[derive(Clone)]
pub struct PipelineExecutor {
    engine: Arc<dyn MediaEngine>,
    reporter: Arc<dyn ProgressReporter>,
    work_root: PathBuf,
}

impl PipelineExecutor {
    pub fn new(engine: Arc<dyn MediaEngine>, reporter: Arc<dyn ProgressReporter>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            reporter,
            work_root: work_root.into(),
        }
    }

    /// Download the source and run every stage of `plan` in order.
    ///
    /// Stops at the first failure; the workspace and everything in it is
    /// removed before the error is returned.
    pub async fn execute(
        &self,
        job_id: &JobId,
        url: &str,
        video_name: &str,
        plan: &Plan,
    ) -> Result<PipelineOutput, PipelineError> {
        let logger = JobLogger::new(job_id, "pipeline");
        logger.log_start(&format!("plan {}", plan));

        self.reporter.report(job_id, DOWNLOADING_LABEL);
        logger.log_state(JobState::Downloading);

        let workspace = JobWorkspace::create(&self.work_root, job_id).map_err(|source| PipelineError::Workspace {
            job_id: job_id.clone(),
            source,
        })?;

        let started = Instant::now();
        let source = self
            .engine
            .download(url, video_name, workspace.path())
            .await
            .map_err(|source| PipelineError::Download {
                job_id: job_id.clone(),
                source,
            })?;
        metrics::record_download_duration(started.elapsed().as_secs_f64());
        logger.log_progress(&format!("downloaded {} ({:?})", source.path.display(), source.duration));

        let expected_total = expected_total(plan, source.duration);
        let mut state = PipelineState {
            artifacts: vec![source.path],
            ..Default::default()
        };

        for (index, stage) in plan.iter().enumerate() {
            let kind = stage.kind();
            if kind == StageKind::Download {
                logger.log_warning("download is always the first step, skipping planned download stage");
                continue;
            }

            if let Some(label) = stage.progress_label() {
                self.reporter.report(job_id, label);
            }
            logger.log_state(kind.job_state());

            let ctx = StageContext {
                job_id: job_id.clone(),
                work_dir: workspace.path().to_path_buf(),
                pass: index + 1,
                kind,
                timecode: state.accumulated_timecode,
                expected_total,
            };

            let started = Instant::now();
            let result = self.run_stage(stage, &ctx, &state.artifacts).await;
            metrics::record_stage_duration(kind.as_str(), result.is_ok(), started.elapsed().as_secs_f64());

            let output = result.map_err(|source| PipelineError::Stage {
                kind,
                job_id: job_id.clone(),
                source,
            })?;

            let stale: Vec<PathBuf> = state
                .artifacts
                .iter()
                .filter(|path| !output.artifacts.contains(path))
                .cloned()
                .collect();
            let failed = delete_files(&stale).await;
            if failed > 0 {
                logger.log_warning(&format!("{} artifact(s) from before {} could not be deleted", failed, kind));
            }

            state.artifacts = output.artifacts;
            state.advance_timecode(output.timecode, &logger);
            state.completed.insert(kind);
            debug!(
                job_id = %job_id,
                stage = kind.as_str(),
                artifacts = state.artifacts.len(),
                timecode_ms = state.accumulated_timecode.as_millis() as u64,
                "Stage finished"
            );
        }

        info!(
            job_id = %job_id,
            artifacts = state.artifacts.len(),
            "Pipeline finished"
        );

        Ok(PipelineOutput {
            artifacts: state.artifacts.clone(),
            state,
            workspace,
        })
    }

    async fn run_stage(&self, stage: &Stage, ctx: &StageContext, inputs: &[PathBuf]) -> MediaResult<StageOutput> {
        let output = match stage {
            Stage::Download => return Err(MediaError::invalid_input("download cannot run as a pass")),
            Stage::Manipulate { manipulations, .. } => self.engine.manipulate(ctx, inputs, manipulations).await?,
            Stage::Trim { segments, manipulations } => {
                self.engine.trim(ctx, inputs, segments, manipulations).await?
            }
            Stage::Concat => self.engine.concat(ctx, inputs).await?,
            Stage::RemoveAudio => self.engine.remove_audio(ctx, inputs).await?,
            Stage::Convert => self.engine.convert(ctx, inputs).await?,
        };

        if output.artifacts.is_empty() {
            return Err(MediaError::InvalidVideo(format!("{} produced no output", ctx.kind)));
        }
        Ok(output)
    }
}

/// Expected output timeline over all passes.
///
/// Each pass renders the whole edited video once; its length is the trimmed
/// length when trimming, the source length otherwise.
fn expected_total(plan: &Plan, source: Duration) -> Duration {
    let per_pass = plan
        .iter()
        .find_map(|stage| match stage {
            Stage::Trim { segments, .. } => Some(
                segments
                    .iter()
                    .map(|s| (s.end.min(source.as_secs_f64()) - s.start).max(0.0))
                    .sum::<f64>(),
            ),
            _ => None,
        })
        .map(Duration::from_secs_f64)
        .unwrap_or(source);

    let passes = plan.iter().filter(|s| !matches!(s, Stage::Download)).count() as u32;
    per_pass * passes
}
