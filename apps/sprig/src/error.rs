//! CLI error handling

use std::fmt;

use sprig_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    Ops(sprig_errors::Error),
    /// Some planned packages did not install
    InstallFailed { failed: usize },
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Ops(e) => {
                write!(f, "{}", e.user_message())?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::InstallFailed { failed } => {
                write!(f, "{failed} package(s) did not install")
            }
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Ops(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::InstallFailed { .. } => None,
        }
    }
}

impl From<sprig_errors::Error> for CliError {
    fn from(e: sprig_errors::Error) -> Self {
        CliError::Ops(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
