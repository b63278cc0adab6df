//! Shared data models for the video edit worker.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers and lifecycle states
//! - Edit settings (trim, crop, rotate, mute)
//! - Planned pipeline stages
//! - Encoding profiles for intermediate and delivered artifacts
//! - Progress and failure message schemas

pub mod encoding;
pub mod error;
pub mod job;
pub mod message;
pub mod settings;
pub mod stage;
pub mod timestamp;

// Re-export common types
pub use encoding::{DeliveryFormat, EncodingConfig};
pub use error::{ModelError, ModelResult};
pub use job::{JobId, JobState};
pub use message::{FailureMessage, ProgressMessage};
pub use settings::{CropParams, JobSettings, Manipulations, Rotation, TrimMode, TrimSegment};
pub use stage::{Plan, Stage, StageKind};
