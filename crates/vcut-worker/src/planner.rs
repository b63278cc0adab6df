//! Pipeline planning: turn edit settings into an ordered list of passes.

use std::str::FromStr;

use vcut_models::{JobSettings, Manipulations, Plan, Stage};

/// How edit requests are grouped into external transform invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Rotate, crop and mute share one pass, folded into the trim when
    /// trimming.
    #[default]
    Fold,
    /// One pass per edit, in the order trim, rotate, crop, concat, mute.
    Separate,
}

impl MergePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fold => "fold",
            Self::Separate => "separate",
        }
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fold" => Ok(Self::Fold),
            "separate" => Ok(Self::Separate),
            other => Err(format!("unknown merge policy: {other}")),
        }
    }
}

/// Plan the passes for a job. Pure and total; the last stage is `Convert`.
pub fn plan(settings: &JobSettings, policy: MergePolicy) -> Plan {
    match policy {
        MergePolicy::Fold => plan_folded(settings),
        MergePolicy::Separate => plan_separate(settings),
    }
}

fn plan_folded(settings: &JobSettings) -> Plan {
    let manipulations = settings.manipulations();
    let mut stages = Vec::new();

    if settings.trim_video {
        stages.push(Stage::Trim {
            segments: settings.trims.clone(),
            manipulations,
        });
    } else if !manipulations.is_empty() {
        stages.push(Stage::Manipulate {
            manipulations,
            single_edit: false,
        });
    }

    if settings.needs_concat() {
        stages.push(Stage::Concat);
    }

    stages.push(Stage::Convert);
    Plan::new(stages)
}

fn plan_separate(settings: &JobSettings) -> Plan {
    let manipulations = settings.manipulations();
    let mut stages = Vec::new();

    if settings.trim_video {
        stages.push(Stage::Trim {
            segments: settings.trims.clone(),
            manipulations: Manipulations::default(),
        });
    }
    if let Some(rotation) = manipulations.rotate {
        stages.push(Stage::Manipulate {
            manipulations: Manipulations::rotate(rotation),
            single_edit: true,
        });
    }
    if let Some(crop) = manipulations.crop {
        stages.push(Stage::Manipulate {
            manipulations: Manipulations::crop(crop),
            single_edit: true,
        });
    }
    if settings.needs_concat() {
        stages.push(Stage::Concat);
    }
    if manipulations.disable_audio {
        stages.push(Stage::RemoveAudio);
    }

    stages.push(Stage::Convert);
    Plan::new(stages)
}
