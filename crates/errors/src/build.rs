//! Build and fetch error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum BuildError {
    #[error("failed to obtain source for {package}: {message}")]
    FetchFailed { package: String, message: String },

    #[error("{phase} phase failed for {package}: {message}")]
    PhaseFailed {
        package: String,
        phase: String,
        message: String,
    },

    #[error("hook {hook} failed in {phase}: {message}")]
    HookFailed {
        hook: String,
        phase: String,
        message: String,
    },

    #[error("build of {hash} failed: {message}")]
    BuildFailed { hash: String, message: String },

    #[error("failed to spawn {command}: {message}")]
    SpawnFailed { command: String, message: String },
}

impl UserFacingError for BuildError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::FetchFailed { .. } => Some("Check that the source mirror contains the package."),
            Self::PhaseFailed { .. } | Self::HookFailed { .. } | Self::BuildFailed { .. } => {
                Some("Inspect the build log for the failing package.")
            }
            Self::SpawnFailed { .. } => Some("Ensure the build tool is installed and on PATH."),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::FetchFailed { .. } => "build.fetch_failed",
            Self::PhaseFailed { .. } => "build.phase_failed",
            Self::HookFailed { .. } => "build.hook_failed",
            Self::BuildFailed { .. } => "build.failed",
            Self::SpawnFailed { .. } => "build.spawn_failed",
        };
        Some(code)
    }
}
