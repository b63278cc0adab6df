//! Planned pipeline stages.
//!
//! A [`Stage`] is one external transform invocation with its parameters
//! fixed at planning time. A [`Plan`] is the ordered, immutable sequence of
//! stages for one job; its last stage is always [`Stage::Convert`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::JobState;
use crate::settings::{Manipulations, TrimSegment};

/// Progress label emitted before the source download.
pub const DOWNLOADING_LABEL: &str = "downloading";

const ROTATING_LABEL: &str = "rotating";
const CROPPING_LABEL: &str = "cropping";

/// Kind of a stage, without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Download,
    Manipulate,
    Trim,
    Concat,
    RemoveAudio,
    Convert,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Download => "download",
            StageKind::Manipulate => "manipulate",
            StageKind::Trim => "trim",
            StageKind::Concat => "concat",
            StageKind::RemoveAudio => "remove_audio",
            StageKind::Convert => "convert",
        }
    }

    /// Label published on the progress channel when the stage starts.
    ///
    /// Conversion runs silently: the backend treats the last labelled stage
    /// as "in progress" until the upload arrives.
    pub fn progress_label(&self) -> Option<&'static str> {
        match self {
            StageKind::Download => Some(DOWNLOADING_LABEL),
            StageKind::Manipulate => Some("manipulations"),
            StageKind::Trim => Some("trimming"),
            StageKind::Concat => Some("concating"),
            StageKind::RemoveAudio => Some("losing audio"),
            StageKind::Convert => None,
        }
    }

    /// Job state while this stage runs.
    pub fn job_state(&self) -> JobState {
        match self {
            StageKind::Download => JobState::Downloading,
            StageKind::Manipulate | StageKind::RemoveAudio => JobState::Manipulating,
            StageKind::Trim => JobState::Trimming,
            StageKind::Concat => JobState::Concatenating,
            StageKind::Convert => JobState::Converting,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned external transform invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stage {
    /// Fetch the source video
    Download,
    /// Rotate/crop/mute in one re-encode
    Manipulate {
        manipulations: Manipulations,
        /// Report the pass by its single edit ("rotating", "cropping")
        /// instead of the combined "manipulations" label.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        single_edit: bool,
    },
    /// Cut segments out of the source, folding manipulations into the same pass
    Trim {
        segments: Vec<TrimSegment>,
        manipulations: Manipulations,
    },
    /// Join all current artifacts into one
    Concat,
    /// Drop the audio track
    RemoveAudio,
    /// Normalize to the delivery format
    Convert,
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Download => StageKind::Download,
            Stage::Manipulate { .. } => StageKind::Manipulate,
            Stage::Trim { .. } => StageKind::Trim,
            Stage::Concat => StageKind::Concat,
            Stage::RemoveAudio => StageKind::RemoveAudio,
            Stage::Convert => StageKind::Convert,
        }
    }

    pub fn progress_label(&self) -> Option<&'static str> {
        match self {
            Stage::Manipulate {
                manipulations,
                single_edit: true,
            } if manipulations.rotate.is_some() => Some(ROTATING_LABEL),
            Stage::Manipulate {
                manipulations,
                single_edit: true,
            } if manipulations.crop.is_some() => Some(CROPPING_LABEL),
            other => other.kind().progress_label(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Trim { segments, .. } => write!(f, "trim({} segments)", segments.len()),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

/// Ordered sequence of stages for one job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Plan(Vec<Stage>);

impl Plan {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self(stages)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.0
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.0.iter().map(Stage::kind).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stage> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Stage;
    type IntoIter = std::slice::Iter<'a, Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", names.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{CropParams, Rotation};

    #[test]
    fn test_labels_match_backend_vocabulary() {
        assert_eq!(StageKind::Manipulate.progress_label(), Some("manipulations"));
        assert_eq!(StageKind::Trim.progress_label(), Some("trimming"));
        assert_eq!(StageKind::Concat.progress_label(), Some("concating"));
        assert_eq!(StageKind::RemoveAudio.progress_label(), Some("losing audio"));
        assert_eq!(StageKind::Convert.progress_label(), None);
    }

    #[test]
    fn test_plan_display() {
        let plan = Plan::new(vec![
            Stage::Trim {
                segments: vec![TrimSegment::new(0.0, 5.0), TrimSegment::new(10.0, 15.0)],
                manipulations: Manipulations::mute(),
            },
            Stage::Concat,
            Stage::Convert,
        ]);
        assert_eq!(plan.kinds(), vec![StageKind::Trim, StageKind::Concat, StageKind::Convert]);
        assert_eq!(plan.to_string(), "[trim(2 segments) -> concat -> convert]");
    }

    #[test]
    fn test_stage_serializes_tagged() {
        let stage = Stage::Manipulate {
            manipulations: Manipulations::rotate(Rotation::Clockwise90),
            single_edit: false,
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert_eq!(json["kind"], "manipulate");
        assert_eq!(json["manipulations"]["rotate"], 90);
        assert!(json.get("single_edit").is_none());
    }

    #[test]
    fn test_single_edit_passes_use_edit_labels() {
        let rotate = Stage::Manipulate {
            manipulations: Manipulations::rotate(Rotation::Half),
            single_edit: true,
        };
        let crop = Stage::Manipulate {
            manipulations: Manipulations::crop(CropParams::new(10, 10, 0, 0)),
            single_edit: true,
        };
        let folded = Stage::Manipulate {
            manipulations: Manipulations::rotate(Rotation::Half),
            single_edit: false,
        };
        assert_eq!(rotate.progress_label(), Some("rotating"));
        assert_eq!(crop.progress_label(), Some("cropping"));
        assert_eq!(folded.progress_label(), Some("manipulations"));
    }

    #[test]
    fn test_stage_job_states() {
        assert_eq!(StageKind::Trim.job_state(), JobState::Trimming);
        assert_eq!(StageKind::Convert.job_state(), JobState::Converting);
        assert_eq!(StageKind::RemoveAudio.job_state(), JobState::Manipulating);
    }
}
