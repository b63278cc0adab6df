//! Raw job payloads as they arrive on the job stream.
//!
//! Producers send the edit settings either flat or nested under `settings`,
//! with `_id`, `url` and `videoName` as siblings. Sibling fields win over
//! nested ones. Crop may be a `crop` object or the flat `out_width`,
//! `out_height`, `x_value`, `y_value` fields, and `rotateValue = -1` means
//! no rotation.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use vcut_models::{CropParams, JobId, JobSettings, ModelError, Rotation, TrimMode, TrimSegment};

use crate::error::{QueueError, QueueResult};

/// `rotateValue` meaning "leave the orientation alone".
pub const NO_ROTATION: i32 = -1;

/// Merged payload before validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoPayload {
    #[serde(rename = "_id")]
    pub id: JobId,
    pub url: String,
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
    #[serde(default)]
    pub crop: Option<CropParams>,
    #[serde(default, rename = "out_width", deserialize_with = "lenient_u32")]
    pub out_width: Option<u32>,
    #[serde(default, rename = "out_height", deserialize_with = "lenient_u32")]
    pub out_height: Option<u32>,
    #[serde(default, rename = "x_value", deserialize_with = "lenient_u32")]
    pub x_value: Option<u32>,
    #[serde(default, rename = "y_value", deserialize_with = "lenient_u32")]
    pub y_value: Option<u32>,

    #[serde(default)]
    pub rotate_video: Option<bool>,
    #[serde(default)]
    pub rotate_value: Option<i32>,

    #[serde(default)]
    pub disable_audio: bool,
}

impl ProcessVideoPayload {
    /// Crop rectangle from the object form, else from the flat fields.
    fn crop_params(&self) -> Option<CropParams> {
        self.crop.or_else(|| match (self.out_width, self.out_height) {
            (Some(width), Some(height)) => Some(CropParams::new(
                width,
                height,
                self.x_value.unwrap_or(0),
                self.y_value.unwrap_or(0),
            )),
            _ => None,
        })
    }

    /// Convert into validated settings.
    pub fn into_settings(self) -> Result<JobSettings, ModelError> {
        let crop = self.crop_params();

        let (rotate_video, rotate_value) = match self.rotate_value {
            Some(NO_ROTATION) => (false, None),
            Some(degrees) => (true, Some(Rotation::try_from(degrees)?)),
            None => (self.rotate_video.unwrap_or(false), None),
        };

        let settings = JobSettings {
            id: self.id,
            url: self.url,
            video_name: self.video_name,
            trim_video: self.trim_video,
            trims: self.trims,
            mode: self.mode,
            crop_video: self.crop_video,
            crop,
            rotate_video,
            rotate_value,
            disable_audio: self.disable_audio,
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Parse and validate a raw payload.
///
/// On failure the error carries the job id when `_id` was readable, so the
/// caller can still report the job as failed.
pub fn parse_payload(raw: &str) -> QueueResult<JobSettings> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| QueueError::invalid_payload(None, format!("not JSON: {e}")))?;
    let job_id = extract_job_id(&value);

    let merged = merge_settings(value)
        .ok_or_else(|| QueueError::invalid_payload(job_id.clone(), "payload is not a JSON object"))?;

    let payload: ProcessVideoPayload = serde_json::from_value(Value::Object(merged))
        .map_err(|e| QueueError::invalid_payload(job_id.clone(), e.to_string()))?;

    payload
        .into_settings()
        .map_err(|e| QueueError::invalid_payload(job_id, e.to_string()))
}

/// Read `_id` from a payload that may otherwise be unusable.
pub fn extract_job_id(value: &Value) -> Option<JobId> {
    let id = value.get("_id").or_else(|| value.get("settings")?.get("_id"))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(JobId::from(s.as_str())),
        Value::Number(n) => Some(JobId::from_string(n.to_string())),
        _ => None,
    }
}

/// Job id of a raw payload, when it is JSON carrying a usable `_id`.
pub fn payload_job_id(raw: &str) -> Option<JobId> {
    let value: Value = serde_json::from_str(raw).ok()?;
    extract_job_id(&value)
}

/// Flatten `settings` into the top level; siblings take precedence.
fn merge_settings(value: Value) -> Option<Map<String, Value>> {
    let Value::Object(mut rest) = value else {
        return None;
    };

    let mut merged = match rest.remove("settings") {
        Some(Value::Object(settings)) => settings,
        _ => Map::new(),
    };
    merged.extend(rest);
    Some(merged)
}

/// Accept integers, floats and numeric strings; fractions are rounded.
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    let number = match raw {
        None => return Ok(None),
        Some(Raw::Number(n)) => n,
        Some(Raw::Text(s)) if s.trim().is_empty() => return Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got {s:?}")))?,
    };

    if !number.is_finite() || number < 0.0 || number > u32::MAX as f64 {
        return Err(serde::de::Error::custom(format!("out of range: {number}")));
    }
    Ok(Some(number.round() as u32))
}
