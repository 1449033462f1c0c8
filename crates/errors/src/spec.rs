//! Spec model error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum SpecError {
    #[error("invalid spec `{input}`: {message}")]
    Parse { input: String, message: String },

    #[error("conflicting constraints on {package}: {left} vs {right}")]
    ConflictingConstraints {
        package: String,
        left: String,
        right: String,
    },

    #[error("spec is not concrete: {spec}")]
    NotConcrete { spec: String },

    #[error("unknown variant {variant} on {package}")]
    UnknownVariant { package: String, variant: String },

    #[error("malformed concrete graph: {message}")]
    MalformedGraph { message: String },
}

impl UserFacingError for SpecError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Parse { .. } => {
                Some("Spec syntax is `name@version %compiler +variant key=value ^dependency`.")
            }
            Self::ConflictingConstraints { .. } => {
                Some("Drop one of the conflicting requirements or widen a version range.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Parse { .. } => "spec.parse",
            Self::ConflictingConstraints { .. } => "spec.conflicting_constraints",
            Self::NotConcrete { .. } => "spec.not_concrete",
            Self::UnknownVariant { .. } => "spec.unknown_variant",
            Self::MalformedGraph { .. } => "spec.malformed_graph",
        };
        Some(code)
    }
}
