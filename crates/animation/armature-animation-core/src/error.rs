//! Error types for the animation core.
//!
//! Numeric degeneracies (short channels, zero-length IK segments, non-positive
//! speeds) never surface here; they fall back silently. Errors are reserved for
//! contract violations at the call site and malformed input documents.

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AnimationError {
    /// The caller broke an API contract (name collision, self-composition, ...).
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    #[error("Bone not found: {name}")]
    BoneNotFound { name: String },

    #[error("Duplicate bone name: {name}")]
    DuplicateBone { name: String },

    #[error("Invalid skeleton: {reason}")]
    InvalidSkeleton { reason: String },

    #[error("Invalid animation: {reason}")]
    InvalidAnimation { reason: String },

    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },
}

impl AnimationError {
    /// Shorthand for [`AnimationError::InvalidOperation`].
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }

    /// Get error category for logging/metrics
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidOperation { .. } => "contract",
            Self::BoneNotFound { .. } => "data",
            Self::DuplicateBone { .. }
            | Self::InvalidSkeleton { .. }
            | Self::InvalidAnimation { .. } => "validation",
            Self::SerializationError { .. } => "serialization",
        }
    }
}

impl From<serde_json::Error> for AnimationError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            reason: err.to_string(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, AnimationError>;
