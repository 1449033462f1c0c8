//! Version and constraint parsing error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum VersionError {
    #[error("invalid version: {input}")]
    InvalidVersion { input: String },

    #[error("invalid version constraint: {input}")]
    InvalidConstraint { input: String },

    #[error("empty version range: {input}")]
    EmptyRange { input: String },
}

impl UserFacingError for VersionError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidVersion { .. } => {
                Some("Versions are dotted tokens such as 1.2.3, 2.0rc1 or develop.")
            }
            Self::InvalidConstraint { .. } | Self::EmptyRange { .. } => {
                Some("Use `@1.2`, `@=1.2`, `@1.2:1.4`, `@:2.0` or a comma-separated list.")
            }
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidVersion { .. } => "version.invalid_version",
            Self::InvalidConstraint { .. } => "version.invalid_constraint",
            Self::EmptyRange { .. } => "version.empty_range",
        };
        Some(code)
    }
}
