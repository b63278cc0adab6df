#![deny(unreachable_patterns)]
//! Stage catalog for the video edit pipeline.
//!
//! This crate provides:
//! - The [`MediaEngine`] trait: one operation per stage kind
//! - [`FfmpegEngine`], its implementation on top of the FFmpeg CLI
//! - Type-safe FFmpeg command building and progress parsing
//! - HTTP source download and ffprobe inspection
//! - Best-effort artifact deletion

pub mod command;
pub mod download;
pub mod engine;
pub mod error;
pub mod ffmpeg_engine;
pub mod filters;
pub mod fs_utils;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use download::{download_video, DownloadedVideo};
pub use engine::{MediaEngine, StageContext, StageOutput};
pub use error::{MediaError, MediaResult};
pub use ffmpeg_engine::{EngineConfig, FfmpegEngine};
pub use fs_utils::delete_files;
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, TimelineProgress};
