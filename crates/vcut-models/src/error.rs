//! Validation errors for edit settings.

use thiserror::Error;

use crate::timestamp::TimestampError;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("Trimming requested without any trim segments")]
    MissingTrims,

    #[error("Invalid trim segment #{index}: {reason}")]
    InvalidTrim { index: usize, reason: String },

    #[error("Cropping requested without crop parameters")]
    MissingCrop,

    #[error("Invalid crop: {0}")]
    InvalidCrop(String),

    #[error("Rotation requested without a rotation value")]
    MissingRotation,

    #[error("Unsupported rotation: {0} degrees")]
    InvalidRotation(i32),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] TimestampError),
}

impl ModelError {
    pub fn invalid_trim(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidTrim {
            index,
            reason: reason.into(),
        }
    }

    pub fn invalid_crop(msg: impl Into<String>) -> Self {
        Self::InvalidCrop(msg.into())
    }
}
