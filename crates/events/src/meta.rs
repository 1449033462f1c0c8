use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Component that originated the event.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventSource(Cow<'static, str>);

impl EventSource {
    pub const GENERAL: Self = Self::const_str("general");
    pub const RESOLVER: Self = Self::const_str("resolver");
    pub const BUILD: Self = Self::const_str("build");
    pub const STORE: Self = Self::const_str("store");

    const fn const_str(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    /// Borrow the underlying identifier used for logging.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
