//! Install store error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum StoreError {
    #[error("timed out waiting for install lock on {hash}")]
    LockTimeout { hash: String },

    #[error("{hash} is being installed by another process ({holder})")]
    AlreadyInProgressElsewhere { hash: String, holder: String },

    #[error("corrupt install record for {hash}: {message}")]
    CorruptRecord { hash: String, message: String },

    #[error("install record for {hash} is already installed; refusing to mark it {status}")]
    InvalidTransition { hash: String, status: String },

    #[error("lock acquisition failed: {path}")]
    LockFailed { path: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("IO error: {message}")]
    IoError { message: String },
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            message: err.to_string(),
        }
    }
}

impl StoreError {
    /// Convert an `io::Error` into a `StoreError` with an associated path
    #[must_use]
    pub fn from_io_with_path(err: &std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.display().to_string(),
            },
            _ => Self::IoError {
                message: format!("{}: {}", path.display(), err),
            },
        }
    }
}

impl UserFacingError for StoreError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::LockTimeout { .. } | Self::AlreadyInProgressElsewhere { .. } => {
                Some("Wait for the other install to finish, or raise install.lock_timeout_secs.")
            }
            Self::CorruptRecord { .. } => {
                Some("Delete the record under <root>/.sprig/db/records and reinstall.")
            }
            Self::PermissionDenied { .. } => {
                Some("Adjust filesystem permissions on the install root.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. }
                | Self::AlreadyInProgressElsewhere { .. }
                | Self::LockFailed { .. }
                | Self::IoError { .. }
        )
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::LockTimeout { .. } => "store.lock_timeout",
            Self::AlreadyInProgressElsewhere { .. } => "store.in_progress_elsewhere",
            Self::CorruptRecord { .. } => "store.corrupt_record",
            Self::InvalidTransition { .. } => "store.invalid_transition",
            Self::LockFailed { .. } => "store.lock_failed",
            Self::PermissionDenied { .. } => "store.permission_denied",
            Self::IoError { .. } => "store.io_error",
        };
        Some(code)
    }
}
