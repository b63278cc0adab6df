//! Edit settings for a single job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};
use crate::job::JobId;
use crate::timestamp::{deserialize_seconds, MAX_VIDEO_DURATION_SECS};

/// Schemes a source URL may use.
pub const SOURCE_SCHEMES: [&str; 2] = ["http", "https"];

/// How multiple trim segments are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrimMode {
    /// All segments are joined into one video
    #[default]
    Single,
    /// Each segment is delivered as its own video
    Multi,
}

impl TrimMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrimMode::Single => "single",
            TrimMode::Multi => "multi",
        }
    }
}

/// One segment of the source timeline to keep, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrimSegment {
    #[serde(alias = "from", deserialize_with = "deserialize_seconds")]
    #[schemars(with = "f64")]
    pub start: f64,
    #[serde(alias = "to", deserialize_with = "deserialize_seconds")]
    #[schemars(with = "f64")]
    pub end: f64,
}

impl TrimSegment {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the segment in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    fn validate(&self, index: usize) -> ModelResult<()> {
        if self.start >= self.end {
            return Err(ModelError::invalid_trim(index, "start must be before end"));
        }
        if self.end > MAX_VIDEO_DURATION_SECS {
            return Err(ModelError::invalid_trim(index, "end exceeds maximum video duration"));
        }
        Ok(())
    }
}

/// Crop rectangle in output pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CropParams {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
}

impl CropParams {
    pub fn new(width: u32, height: u32, x: u32, y: u32) -> Self {
        Self { width, height, x, y }
    }

    fn validate(&self) -> ModelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ModelError::invalid_crop(format!(
                "crop area must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Clockwise rotation applied to the video.
///
/// Serialized as degrees (`90`, `180`, `270`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Rotation {
    Clockwise90,
    Half,
    Clockwise270,
}

impl Rotation {
    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::Clockwise90 => 90,
            Rotation::Half => 180,
            Rotation::Clockwise270 => 270,
        }
    }
}

impl TryFrom<i32> for Rotation {
    type Error = ModelError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        match degrees.rem_euclid(360) {
            90 => Ok(Rotation::Clockwise90),
            180 => Ok(Rotation::Half),
            270 => Ok(Rotation::Clockwise270),
            _ => Err(ModelError::InvalidRotation(degrees)),
        }
    }
}

impl From<Rotation> for i32 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl JsonSchema for Rotation {
    fn schema_name() -> String {
        "Rotation".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        <i32>::json_schema(gen)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// The merged set of rotate/crop/mute edits eligible for a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Manipulations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<Rotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropParams>,
    #[serde(default)]
    pub disable_audio: bool,
}

impl Manipulations {
    pub fn rotate(rotation: Rotation) -> Self {
        Self {
            rotate: Some(rotation),
            ..Default::default()
        }
    }

    pub fn crop(crop: CropParams) -> Self {
        Self {
            crop: Some(crop),
            ..Default::default()
        }
    }

    pub fn mute() -> Self {
        Self {
            disable_audio: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rotate.is_none() && self.crop.is_none() && !self.disable_audio
    }
}

/// Settings of one edit job, immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSettings {
    /// Backend video record id
    #[serde(rename = "_id")]
    pub id: JobId,
    /// Source video URL
    pub url: String,
    /// Display name of the source video
    #[serde(default)]
    pub video_name: String,

    #[serde(default)]
    pub trim_video: bool,
    #[serde(default)]
    pub trims: Vec<TrimSegment>,
    #[serde(default)]
    pub mode: TrimMode,

    #[serde(default)]
    pub crop_video: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropParams>,

    #[serde(default)]
    pub rotate_video: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate_value: Option<Rotation>,

    #[serde(default)]
    pub disable_audio: bool,
}

impl JobSettings {
    /// Settings with no edits requested.
    pub fn new(id: impl Into<JobId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            video_name: String::new(),
            trim_video: false,
            trims: Vec::new(),
            mode: TrimMode::default(),
            crop_video: false,
            crop: None,
            rotate_video: false,
            rotate_value: None,
            disable_audio: false,
        }
    }

    pub fn with_video_name(mut self, name: impl Into<String>) -> Self {
        self.video_name = name.into();
        self
    }

    pub fn with_trims(mut self, trims: Vec<TrimSegment>, mode: TrimMode) -> Self {
        self.trim_video = true;
        self.trims = trims;
        self.mode = mode;
        self
    }

    pub fn with_crop(mut self, crop: CropParams) -> Self {
        self.crop_video = true;
        self.crop = Some(crop);
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotate_video = true;
        self.rotate_value = Some(rotation);
        self
    }

    pub fn with_audio_disabled(mut self) -> Self {
        self.disable_audio = true;
        self
    }

    /// Rotate/crop/mute edits selected by the set flags.
    pub fn manipulations(&self) -> Manipulations {
        Manipulations {
            rotate: if self.rotate_video { self.rotate_value } else { None },
            crop: if self.crop_video { self.crop } else { None },
            disable_audio: self.disable_audio,
        }
    }

    /// Whether the trimmed segments have to be joined afterwards.
    pub fn needs_concat(&self) -> bool {
        self.trim_video && self.mode == TrimMode::Single && self.trims.len() > 1
    }

    /// Check the settings invariants the planner relies on.
    pub fn validate(&self) -> ModelResult<()> {
        let url = url::Url::parse(&self.url).map_err(|e| ModelError::InvalidUrl(format!("{}: {}", self.url, e)))?;
        if !SOURCE_SCHEMES.contains(&url.scheme()) {
            return Err(ModelError::InvalidUrl(format!(
                "{}: unsupported scheme {}",
                self.url,
                url.scheme()
            )));
        }

        if self.trim_video {
            if self.trims.is_empty() {
                return Err(ModelError::MissingTrims);
            }
            for (index, trim) in self.trims.iter().enumerate() {
                trim.validate(index)?;
            }
        }

        if self.crop_video {
            self.crop.as_ref().ok_or(ModelError::MissingCrop)?.validate()?;
        }

        if self.rotate_video && self.rotate_value.is_none() {
            return Err(ModelError::MissingRotation);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> JobSettings {
        JobSettings::new("video-1", "https://upload.wikimedia.org/a.webm")
    }

    #[test]
    fn test_manipulations_follow_flags() {
        let mut settings = base();
        settings.rotate_value = Some(Rotation::Half);
        settings.crop = Some(CropParams::new(640, 360, 0, 0));
        assert!(settings.manipulations().is_empty());

        let settings = settings.with_rotation(Rotation::Clockwise90).with_audio_disabled();
        let m = settings.manipulations();
        assert_eq!(m.rotate, Some(Rotation::Clockwise90));
        assert_eq!(m.crop, None);
        assert!(m.disable_audio);
    }

    #[test]
    fn test_needs_concat() {
        let two = vec![TrimSegment::new(0.0, 5.0), TrimSegment::new(10.0, 15.0)];
        assert!(base().with_trims(two.clone(), TrimMode::Single).needs_concat());
        assert!(!base().with_trims(two, TrimMode::Multi).needs_concat());
        assert!(!base()
            .with_trims(vec![TrimSegment::new(0.0, 5.0)], TrimMode::Single)
            .needs_concat());
    }

    #[test]
    fn test_validate_rejects_empty_trims() {
        let settings = base().with_trims(Vec::new(), TrimMode::Single);
        assert_eq!(settings.validate(), Err(ModelError::MissingTrims));
    }

    #[test]
    fn test_validate_rejects_reversed_trim() {
        let settings = base().with_trims(vec![TrimSegment::new(8.0, 2.0)], TrimMode::Single);
        assert!(matches!(settings.validate(), Err(ModelError::InvalidTrim { index: 0, .. })));
    }

    #[test]
    fn test_validate_rejects_empty_crop() {
        let settings = base().with_crop(CropParams::new(0, 100, 0, 0));
        assert!(matches!(settings.validate(), Err(ModelError::InvalidCrop(_))));

        let mut settings = base();
        settings.crop_video = true;
        assert_eq!(settings.validate(), Err(ModelError::MissingCrop));
    }

    #[test]
    fn test_validate_rejects_rotation_without_value() {
        let mut settings = base();
        settings.rotate_video = true;
        assert_eq!(settings.validate(), Err(ModelError::MissingRotation));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let settings = JobSettings::new("video-1", "not a url");
        assert!(matches!(settings.validate(), Err(ModelError::InvalidUrl(_))));
    }

    #[test]
    fn test_validate_rejects_local_sources() {
        for url in ["file:///tmp/vcut/other-job/03-convert-0.webm", "ftp://example.org/a.webm"] {
            let settings = JobSettings::new("video-1", url);
            assert!(matches!(settings.validate(), Err(ModelError::InvalidUrl(_))), "{url}");
        }
        assert!(JobSettings::new("video-1", "http://example.org/a.webm").validate().is_ok());
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::try_from(90).unwrap(), Rotation::Clockwise90);
        assert_eq!(Rotation::try_from(-90).unwrap(), Rotation::Clockwise270);
        assert_eq!(Rotation::try_from(450).unwrap(), Rotation::Clockwise90);
        assert!(Rotation::try_from(45).is_err());
        assert!(Rotation::try_from(0).is_err());
    }

    #[test]
    fn test_settings_deserialize_camel_case() {
        let json = r#"{
            "_id": "abc",
            "url": "https://example.org/v.webm",
            "videoName": "v.webm",
            "trimVideo": true,
            "trims": [{"start": 0, "end": "00:00:05"}, {"from": 10, "to": 15}],
            "mode": "single",
            "rotateVideo": true,
            "rotateValue": 90,
            "disableAudio": true
        }"#;
        let settings: JobSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.id.as_str(), "abc");
        assert_eq!(settings.trims[0], TrimSegment::new(0.0, 5.0));
        assert_eq!(settings.trims[1], TrimSegment::new(10.0, 15.0));
        assert_eq!(settings.rotate_value, Some(Rotation::Clockwise90));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_schema_names_wire_fields() {
        let schema = serde_json::to_value(schemars::schema_for!(JobSettings)).unwrap();
        let properties = &schema["properties"];
        assert!(properties.get("_id").is_some());
        assert!(properties.get("trimVideo").is_some());
        assert!(properties.get("rotateValue").is_some());
    }
}
