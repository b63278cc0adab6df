//! Encoding profiles for intermediate and delivered artifacts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec for intermediate passes (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec for intermediate passes
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF for intermediate passes (near-lossless, they are re-encoded later)
pub const DEFAULT_CRF: u8 = 18;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Container of intermediate artifacts
pub const INTERMEDIATE_EXTENSION: &str = "mp4";

/// Encoding configuration for intermediate passes (trim, manipulate, concat).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            preset: default_preset(),
            crf: DEFAULT_CRF,
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// Video codec arguments.
    pub fn video_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
        ];
        args.extend(self.extra_args.clone());
        args
    }

    /// Audio codec arguments, or `-an` when the audio track is dropped.
    pub fn audio_args(&self, keep_audio: bool) -> Vec<String> {
        if !keep_audio {
            return vec!["-an".to_string()];
        }
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }
}

/// Delivery format the backend accepts (WebM with VP9 video and Opus audio).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeliveryFormat {
    pub extension: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// VP9 constant quality level (used with `-b:v 0`)
    pub crf: u8,
    /// libvpx speed/quality tradeoff (0 slowest, 8 fastest)
    pub cpu_used: u8,
}

impl Default for DeliveryFormat {
    fn default() -> Self {
        Self {
            extension: "webm".to_string(),
            video_codec: "libvpx-vp9".to_string(),
            audio_codec: "libopus".to_string(),
            crf: 32,
            cpu_used: 4,
        }
    }
}

impl DeliveryFormat {
    /// FFmpeg output arguments for the conversion pass.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-b:v".to_string(),
            "0".to_string(),
            "-cpu-used".to_string(),
            self.cpu_used.to_string(),
            "-row-mt".to_string(),
            "1".to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncodingConfig::default();
        assert_eq!(config.codec, "libx264");
        assert_eq!(config.crf, 18);
    }

    #[test]
    fn test_video_args() {
        let config = EncodingConfig {
            crf: 20,
            ..Default::default()
        };
        let args = config.video_args();
        assert_eq!(args, vec!["-c:v", "libx264", "-preset", "fast", "-crf", "20"]);
    }

    #[test]
    fn test_audio_args_drop_track() {
        let config = EncodingConfig::default();
        assert_eq!(config.audio_args(false), vec!["-an"]);
        assert!(config.audio_args(true).contains(&"aac".to_string()));
    }

    #[test]
    fn test_delivery_args() {
        let args = DeliveryFormat::default().to_ffmpeg_args();
        assert!(args.contains(&"libvpx-vp9".to_string()));
        assert!(args.contains(&"libopus".to_string()));
        let pos = args.iter().position(|a| a == "-b:v").unwrap();
        assert_eq!(args[pos + 1], "0");
    }
}
