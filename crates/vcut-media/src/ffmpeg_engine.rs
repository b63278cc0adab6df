//! FFmpeg-backed implementation of the stage catalog.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use vcut_models::encoding::INTERMEDIATE_EXTENSION;
use vcut_models::{DeliveryFormat, EncodingConfig, Manipulations, TrimSegment};

use crate::command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
use crate::download::{download_video, DownloadedVideo};
use crate::engine::{MediaEngine, StageContext, StageOutput};
use crate::error::{MediaError, MediaResult};
use crate::filters::{build_video_filter, concat_list};
use crate::fs_utils::delete_files;
use crate::progress::{FfmpegProgress, TimelineProgress};

/// Configuration for the FFmpeg engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Profile for intermediate passes
    pub encoding: EncodingConfig,
    /// Profile for the conversion pass
    pub delivery: DeliveryFormat,
    /// Per-invocation FFmpeg timeout, none by default
    pub ffmpeg_timeout_secs: Option<u64>,
}

/// Runs stages by shelling out to FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    config: EngineConfig,
    client: reqwest::Client,
    runner: FfmpegRunner,
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig, client: reqwest::Client) -> Self {
        let runner = match config.ffmpeg_timeout_secs {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        };
        Self {
            config,
            client,
            runner,
        }
    }

    /// Check that FFmpeg and FFprobe are installed.
    pub fn validate(&self) -> MediaResult<()> {
        let ffmpeg = check_ffmpeg()?;
        let ffprobe = check_ffprobe()?;
        info!(
            ffmpeg = %ffmpeg.display(),
            ffprobe = %ffprobe.display(),
            "Media tools available"
        );
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn trim_command(
        &self,
        input: &Path,
        output: &Path,
        segment: &TrimSegment,
        manipulations: &Manipulations,
    ) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(input, output)
            .seek(segment.start)
            .duration(segment.duration());
        if let Some(filter) = build_video_filter(manipulations) {
            cmd = cmd.video_filter(filter);
        }
        cmd.output_args(self.config.encoding.video_args())
            .output_args(self.config.encoding.audio_args(!manipulations.disable_audio))
    }

    fn manipulate_command(&self, input: &Path, output: &Path, manipulations: &Manipulations) -> FfmpegCommand {
        let cmd = FfmpegCommand::new(input, output);
        let cmd = match build_video_filter(manipulations) {
            Some(filter) => cmd
                .video_filter(filter)
                .output_args(self.config.encoding.video_args()),
            None => cmd.video_copy(),
        };
        if manipulations.disable_audio {
            cmd.no_audio()
        } else {
            cmd.output_args(["-c:a", "copy"])
        }
    }

    fn convert_command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output).output_args(self.config.delivery.to_ffmpeg_args())
    }

    /// Run one FFmpeg invocation and return the duration it rendered.
    async fn render(&self, ctx: &StageContext, cmd: &FfmpegCommand, offset: Duration) -> MediaResult<Duration> {
        let rendered_ms = Arc::new(AtomicU64::new(0));
        let timeline = TimelineProgress::new(offset, ctx.expected_total);

        let job_id = ctx.job_id.clone();
        let kind = ctx.kind;
        let tracker = Arc::clone(&rendered_ms);
        self.runner
            .run_with_progress(cmd, move |progress: FfmpegProgress| {
                tracker.fetch_max(progress.out_time().as_millis() as u64, Ordering::Relaxed);
                if progress.is_complete {
                    debug!(job_id = %job_id, stage = kind.as_str(), frames = progress.frame, "Encoding pass complete");
                } else if let Some(percent) = timeline.percentage(&progress) {
                    debug!(
                        job_id = %job_id,
                        stage = kind.as_str(),
                        percent = (percent * 10.0).round() / 10.0,
                        frame = progress.frame,
                        fps = progress.fps,
                        speed = progress.speed,
                        "Encoding progress"
                    );
                }
            })
            .await?;

        Ok(Duration::from_millis(rendered_ms.load(Ordering::Relaxed)))
    }

    /// Run one command per input, accumulating the rendered timeline.
    async fn render_each<F>(&self, ctx: &StageContext, inputs: &[PathBuf], extension: &str, build: F) -> MediaResult<StageOutput>
    where
        F: Fn(&Path, &Path) -> FfmpegCommand,
    {
        if inputs.is_empty() {
            return Err(MediaError::invalid_input(format!("{} pass has no inputs", ctx.kind)));
        }

        let mut timecode = ctx.timecode;
        let mut artifacts = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let output = ctx.output_path(index, extension);
            let cmd = build(input, &output);
            timecode += self.render(ctx, &cmd, timecode).await?;
            artifacts.push(output);
        }

        Ok(StageOutput::new(artifacts).with_timecode(timecode))
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn download(&self, url: &str, video_name: &str, dir: &Path) -> MediaResult<DownloadedVideo> {
        download_video(&self.client, url, video_name, dir).await
    }

    async fn trim(
        &self,
        ctx: &StageContext,
        inputs: &[PathBuf],
        segments: &[TrimSegment],
        manipulations: &Manipulations,
    ) -> MediaResult<StageOutput> {
        let [input] = inputs else {
            return Err(MediaError::invalid_input(format!(
                "trim expects exactly one input, got {}",
                inputs.len()
            )));
        };
        if segments.is_empty() {
            return Err(MediaError::invalid_input("trim requires at least one segment"));
        }

        let mut timecode = ctx.timecode;
        let mut artifacts = Vec::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            let output = ctx.output_path(index, INTERMEDIATE_EXTENSION);
            let cmd = self.trim_command(input, &output, segment, manipulations);
            timecode += self.render(ctx, &cmd, timecode).await?;
            artifacts.push(output);
        }

        Ok(StageOutput::new(artifacts).with_timecode(timecode))
    }

    async fn manipulate(
        &self,
        ctx: &StageContext,
        inputs: &[PathBuf],
        manipulations: &Manipulations,
    ) -> MediaResult<StageOutput> {
        self.render_each(ctx, inputs, INTERMEDIATE_EXTENSION, |input, output| {
            self.manipulate_command(input, output, manipulations)
        })
        .await
    }

    async fn concat(&self, ctx: &StageContext, inputs: &[PathBuf]) -> MediaResult<StageOutput> {
        if inputs.is_empty() {
            return Err(MediaError::invalid_input("concat pass has no inputs"));
        }

        let list_path = ctx.work_dir.join(format!("{:02}-concat-list.txt", ctx.pass));
        tokio::fs::write(&list_path, concat_list(inputs)).await?;

        let output = ctx.output_path(0, INTERMEDIATE_EXTENSION);
        let cmd = FfmpegCommand::new(&list_path, &output)
            .concat_demuxer()
            .codec_copy();
        let rendered = self.render(ctx, &cmd, ctx.timecode).await;
        delete_files(&[list_path]).await;

        Ok(StageOutput::new(vec![output]).with_timecode(ctx.timecode + rendered?))
    }

    async fn remove_audio(&self, ctx: &StageContext, inputs: &[PathBuf]) -> MediaResult<StageOutput> {
        self.render_each(ctx, inputs, INTERMEDIATE_EXTENSION, |input, output| {
            FfmpegCommand::new(input, output).video_copy().no_audio()
        })
        .await
    }

    async fn convert(&self, ctx: &StageContext, inputs: &[PathBuf]) -> MediaResult<StageOutput> {
        let extension = self.config.delivery.extension.clone();
        self.render_each(ctx, inputs, &extension, |input, output| {
            self.convert_command(input, output)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcut_models::{CropParams, JobId, Rotation, StageKind};

    fn engine() -> FfmpegEngine {
        FfmpegEngine::new(EngineConfig::default(), reqwest::Client::new())
    }

    fn ctx(kind: StageKind) -> StageContext {
        StageContext {
            job_id: JobId::from("v1"),
            work_dir: PathBuf::from("/tmp/vcut-test"),
            pass: 1,
            kind,
            timecode: Duration::ZERO,
            expected_total: Duration::ZERO,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        let pos = args.iter().position(|a| a == flag)?;
        args.get(pos + 1).map(String::as_str)
    }

    #[test]
    fn test_trim_folds_manipulations_into_one_command() {
        let m = Manipulations {
            rotate: Some(Rotation::Clockwise90),
            crop: Some(CropParams::new(100, 80, 0, 0)),
            disable_audio: true,
        };
        let args = engine()
            .trim_command(Path::new("in.webm"), Path::new("out.mp4"), &TrimSegment::new(10.0, 15.0), &m)
            .build_args();

        assert_eq!(value_after(&args, "-ss"), Some("10.000"));
        assert_eq!(value_after(&args, "-t"), Some("5.000"));
        assert_eq!(value_after(&args, "-vf"), Some("transpose=clock,crop=100:80:0:0"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert!(args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_mute_only_manipulation_copies_video() {
        let args = engine()
            .manipulate_command(Path::new("in.mp4"), Path::new("out.mp4"), &Manipulations::mute())
            .build_args();

        assert_eq!(value_after(&args, "-c:v"), Some("copy"));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn test_rotate_manipulation_keeps_audio() {
        let args = engine()
            .manipulate_command(
                Path::new("in.mp4"),
                Path::new("out.mp4"),
                &Manipulations::rotate(Rotation::Half),
            )
            .build_args();

        assert_eq!(value_after(&args, "-vf"), Some("hflip,vflip"));
        assert_eq!(value_after(&args, "-c:a"), Some("copy"));
    }

    #[test]
    fn test_convert_targets_delivery_format() {
        let args = engine()
            .convert_command(Path::new("in.mp4"), Path::new("out.webm"))
            .build_args();
        assert_eq!(value_after(&args, "-c:v"), Some("libvpx-vp9"));
        assert_eq!(value_after(&args, "-c:a"), Some("libopus"));
    }

    #[tokio::test]
    async fn test_trim_rejects_multiple_inputs() {
        let err = engine()
            .trim(
                &ctx(StageKind::Trim),
                &[PathBuf::from("a.mp4"), PathBuf::from("b.mp4")],
                &[TrimSegment::new(0.0, 1.0)],
                &Manipulations::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_convert_rejects_empty_inputs() {
        let err = engine().convert(&ctx(StageKind::Convert), &[]).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidInput(_)));
    }
}
