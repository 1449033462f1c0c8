//! Persisted install records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprig_hash::Hash;
use sprig_types::Version;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    Installed,
    Failed,
    InProgress,
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Installed => "installed",
            Self::Failed => "failed",
            Self::InProgress => "in_progress",
        };
        f.write_str(s)
    }
}

/// What the store knows about one hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub hash: Hash,
    pub name: String,
    pub version: Version,
    pub status: InstallStatus,
    pub prefix: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    /// Requested as a root rather than pulled in as a dependency
    #[serde(default)]
    pub explicit: bool,
    /// Writer of the record
    pub pid: u32,
    pub host: String,
    pub updated_at: DateTime<Utc>,
}

impl InstallRecord {
    /// A record stamped with the current process and time
    #[must_use]
    pub fn new(
        hash: Hash,
        name: impl Into<String>,
        version: Version,
        status: InstallStatus,
        prefix: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hash,
            name: name.into(),
            version,
            status,
            prefix: prefix.into(),
            log_path: None,
            explicit: false,
            pid: std::process::id(),
            host: crate::lock::local_host(),
            updated_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.status == InstallStatus::Installed
    }
}
