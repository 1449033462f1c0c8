//! Per-node outcomes of an executed plan

use serde::Serialize;
use sprig_errors::Error;
use sprig_events::NodeOutcomeKind;
use sprig_hash::Hash;
use sprig_types::Version;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Terminal state of one planned node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Built by this run
    Installed,
    /// Present before the run, or built by another process while waiting
    AlreadyInstalled,
    Failed,
    SkippedDueToDependencyFailure,
    /// Never started because the run was cancelled or stopped early
    Cancelled,
}

impl NodeStatus {
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Installed | Self::AlreadyInstalled)
    }
}

impl From<NodeStatus> for NodeOutcomeKind {
    fn from(status: NodeStatus) -> Self {
        match status {
            NodeStatus::Installed => Self::Installed,
            NodeStatus::AlreadyInstalled => Self::AlreadyInstalled,
            NodeStatus::Failed => Self::Failed,
            NodeStatus::SkippedDueToDependencyFailure => Self::Skipped,
            NodeStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Installed => "installed",
            Self::AlreadyInstalled => "already_installed",
            Self::Failed => "failed",
            Self::SkippedDueToDependencyFailure => "skipped_due_to_dependency_failure",
            Self::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub hash: Hash,
    pub name: String,
    pub version: Version,
    pub explicit: bool,
    pub status: NodeStatus,
    pub prefix: PathBuf,
    pub log_path: Option<PathBuf>,
    /// Why the node failed
    pub error: Option<Error>,
    /// The failed dependency that caused a skip
    pub cause: Option<Hash>,
}

/// Result of [`crate::BuildGraphScheduler::execute`], in plan order
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub run_id: String,
    pub outcomes: Vec<NodeOutcome>,
    pub duration: Duration,
}

impl ExecutionReport {
    #[must_use]
    pub fn get(&self, hash: &Hash) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| &o.hash == hash)
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    #[must_use]
    pub fn count(&self, status: NodeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// True when every requested root ended installed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .filter(|o| o.explicit)
            .all(|o| o.status.is_success())
    }

    /// Requested roots that did not end installed
    pub fn failed_roots(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.explicit && !o.status.is_success())
    }
}
