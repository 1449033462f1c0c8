//! Concretization error types

use std::borrow::Cow;
use std::fmt;

use crate::UserFacingError;
use thiserror::Error;

/// One requirement participating in a conflict, with the chain of
/// dependents that introduced it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConflictRecord {
    pub package: String,
    pub reason: String,
    pub origins: Vec<String>,
}

impl fmt::Display for ConflictRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.package, self.reason)?;
        if !self.origins.is_empty() {
            write!(f, " (required by {})", self.origins.join(", "))?;
        }
        Ok(())
    }
}

fn render_conflicts(conflicts: &[ConflictRecord]) -> String {
    conflicts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ResolveError {
    #[error("unknown package: {name}")]
    UnknownPackage { name: String },

    #[error("unsatisfiable constraints: {}", render_conflicts(.conflicts))]
    UnsatisfiableConstraints { conflicts: Vec<ConflictRecord> },

    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("search limit of {limit} steps exceeded")]
    SearchLimitExceeded { limit: usize },

    #[error("no provider for virtual package {name}")]
    NoProvider { name: String },

    #[error("invalid recipe {package}: {message}")]
    InvalidRecipe { package: String, message: String },
}

impl UserFacingError for ResolveError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownPackage { .. } => Some("Check the recipe directory for the package name."),
            Self::UnsatisfiableConstraints { .. } => {
                Some("Relax one of the listed requirements and concretize again.")
            }
            Self::CyclicDependency { .. } => {
                Some("Break the cycle in the recipes, or turn one edge into a run dependency.")
            }
            Self::SearchLimitExceeded { .. } => {
                Some("Pin more versions in the request or raise resolver.max_steps.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnknownPackage { .. } => "resolve.unknown_package",
            Self::UnsatisfiableConstraints { .. } => "resolve.unsatisfiable",
            Self::CyclicDependency { .. } => "resolve.cyclic_dependency",
            Self::SearchLimitExceeded { .. } => "resolve.search_limit",
            Self::NoProvider { .. } => "resolve.no_provider",
            Self::InvalidRecipe { .. } => "resolve.invalid_recipe",
        };
        Some(code)
    }
}
