//! Messages published to the progress and finish channels.
//!
//! Field names match what the backend consumes (`videoId`, `stage`,
//! `success`).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Stage-name progress event for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressMessage {
    #[serde(rename = "videoId")]
    pub video_id: JobId,
    pub stage: String,
}

impl ProgressMessage {
    pub fn new(video_id: &JobId, stage: impl Into<String>) -> Self {
        Self {
            video_id: video_id.clone(),
            stage: stage.into(),
        }
    }
}

/// Job failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailureMessage {
    pub success: bool,
    #[serde(rename = "videoId")]
    pub video_id: JobId,
}

impl FailureMessage {
    pub fn new(video_id: &JobId) -> Self {
        Self {
            success: false,
            video_id: video_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_message_wire_format() {
        let msg = ProgressMessage::new(&JobId::from("v1"), "trimming");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"videoId":"v1","stage":"trimming"}"#);
    }

    #[test]
    fn test_failure_message_wire_format() {
        let msg = FailureMessage::new(&JobId::from("v1"));
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"success":false,"videoId":"v1"}"#);
    }
}
