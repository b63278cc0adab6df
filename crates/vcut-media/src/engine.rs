//! The stage catalog: media operations a pipeline can invoke.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vcut_models::{JobId, Manipulations, StageKind, TrimSegment};

use crate::download::DownloadedVideo;
use crate::error::MediaResult;

/// Per-invocation context handed to every transform.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub job_id: JobId,
    /// Job-scoped directory where outputs are written.
    pub work_dir: PathBuf,
    /// 1-based position of the pass in the plan.
    pub pass: usize,
    pub kind: StageKind,
    /// Output timeline consumed by prior passes.
    pub timecode: Duration,
    /// Expected total output duration across the plan, zero if unknown.
    pub expected_total: Duration,
}

impl StageContext {
    /// Path for the `index`-th output of this pass.
    pub fn output_path(&self, index: usize, extension: &str) -> PathBuf {
        self.work_dir
            .join(format!("{:02}-{}-{}.{}", self.pass, self.kind.as_str(), index, extension))
    }
}

/// Result of one transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    /// Produced artifacts, in order.
    pub artifacts: Vec<PathBuf>,
    /// New accumulated timecode, when the pass reports one.
    pub timecode: Option<Duration>,
}

impl StageOutput {
    pub fn new(artifacts: Vec<PathBuf>) -> Self {
        Self {
            artifacts,
            timecode: None,
        }
    }

    pub fn with_timecode(mut self, timecode: Duration) -> Self {
        self.timecode = Some(timecode);
        self
    }
}

/// Media operations used by the pipeline executor.
///
/// Transforms never delete their inputs; the executor owns artifact
/// lifetimes.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Fetch the source video into `dir`.
    async fn download(&self, url: &str, video_name: &str, dir: &Path) -> MediaResult<DownloadedVideo>;

    /// Cut each segment out of the single input, applying the manipulations
    /// in the same pass. One output per segment.
    async fn trim(
        &self,
        ctx: &StageContext,
        inputs: &[PathBuf],
        segments: &[TrimSegment],
        manipulations: &Manipulations,
    ) -> MediaResult<StageOutput>;

    /// Apply rotate, crop and mute to every input.
    async fn manipulate(
        &self,
        ctx: &StageContext,
        inputs: &[PathBuf],
        manipulations: &Manipulations,
    ) -> MediaResult<StageOutput>;

    /// Join all inputs into one output, in order.
    async fn concat(&self, ctx: &StageContext, inputs: &[PathBuf]) -> MediaResult<StageOutput>;

    /// Strip audio from every input.
    async fn remove_audio(&self, ctx: &StageContext, inputs: &[PathBuf]) -> MediaResult<StageOutput>;

    /// Encode every input to the delivery format.
    async fn convert(&self, ctx: &StageContext, inputs: &[PathBuf]) -> MediaResult<StageOutput>;
}
