#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in sprig
//!
//! Long-running operations (concretization, scheduling, builds, store
//! locking) publish typed events on an optional unbounded channel. Library
//! crates never print; the CLI drains the channel and forwards each event
//! to `tracing` at the level reported by [`AppEvent::log_level`].

pub mod meta;
pub use meta::EventSource;

pub mod events;
pub use events::{
    AppEvent, BuildEvent, FailureContext, GeneralEvent, NodeOutcomeKind, ResolverEvent,
    StoreEvent,
};

use tokio::sync::mpsc::UnboundedSender;

/// Type alias for event sender using the `AppEvent` system
pub type EventSender = UnboundedSender<AppEvent>;

/// Type alias for event receiver using the `AppEvent` system
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<AppEvent>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events throughout sprig
///
/// Implemented by anything that may own a sender; emission is a no-op when
/// no sender is attached.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(event);
        }
    }

    fn emit_debug(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::debug(message)));
    }

    fn emit_warning(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning(message)));
    }

    fn emit_warning_with_context(&self, message: impl Into<String>, context: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning_with_context(
            message, context,
        )));
    }

    fn emit_error(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::error(message)));
    }

    fn emit_operation_started(&self, operation: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::OperationStarted {
            operation: operation.into(),
        }));
    }

    fn emit_operation_completed(&self, operation: impl Into<String>, success: bool) {
        self.emit(AppEvent::General(GeneralEvent::OperationCompleted {
            operation: operation.into(),
            success,
        }));
    }

    fn emit_operation_failed(&self, operation: impl Into<String>, error: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::OperationFailed {
            operation: operation.into(),
            error: error.into(),
        }));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}

impl EventEmitter for Option<EventSender> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.as_ref()
    }
}

/// Forward an event to `tracing` with its domain target and level
pub fn log_event(event: &AppEvent) {
    let fields = event.log_fields();
    let source = event.event_source();
    match event.log_level() {
        tracing::Level::ERROR => tracing::error!(source = source.as_str(), "{fields}"),
        tracing::Level::WARN => tracing::warn!(source = source.as_str(), "{fields}"),
        tracing::Level::INFO => tracing::info!(source = source.as_str(), "{fields}"),
        tracing::Level::DEBUG => tracing::debug!(source = source.as_str(), "{fields}"),
        tracing::Level::TRACE => tracing::trace!(source = source.as_str(), "{fields}"),
    }
}
