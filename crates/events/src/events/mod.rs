use serde::{Deserialize, Serialize};

use crate::EventSource;
use sprig_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod build;
pub mod general;
pub mod resolver;
pub mod store;

pub use build::*;
pub use general::*;
pub use resolver::*;
pub use store::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Concretization progress and failures
    Resolver(ResolverEvent),

    /// Plan execution and per-node build lifecycle
    Build(BuildEvent),

    /// Install store locking and record writes
    Store(StoreEvent),
}

impl AppEvent {
    /// Identify the source domain for this event
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Resolver(_) => EventSource::RESOLVER,
            Self::Build(_) => EventSource::BUILD,
            Self::Store(_) => EventSource::STORE,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. } | GeneralEvent::OperationFailed { .. })
            | Self::Resolver(ResolverEvent::Failed { .. })
            | Self::Build(BuildEvent::NodeFinished {
                outcome: NodeOutcomeKind::Failed,
                ..
            }) => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Store(StoreEvent::StaleLockReclaimed { .. } | StoreEvent::CorruptRecord { .. })
            | Self::Build(BuildEvent::NodeFinished {
                outcome: NodeOutcomeKind::Skipped | NodeOutcomeKind::Cancelled,
                ..
            }) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Resolver(ResolverEvent::Backtracked { .. })
            | Self::Build(BuildEvent::PhaseStarted { .. } | BuildEvent::HookRun { .. })
            | Self::Store(
                StoreEvent::LockWaiting { .. }
                | StoreEvent::LockAcquired { .. }
                | StoreEvent::RecordWritten { .. },
            ) => Level::DEBUG,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "sprig::events::general",
            Self::Resolver(_) => "sprig::events::resolver",
            Self::Build(_) => "sprig::events::build",
            Self::Store(_) => "sprig::events::store",
        }
    }

    /// Get structured fields for logging
    #[must_use]
    pub fn log_fields(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
