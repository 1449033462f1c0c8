use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::FailureContext;

/// Terminal state of one node in an executed plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOutcomeKind {
    Installed,
    AlreadyInstalled,
    Failed,
    Skipped,
    Cancelled,
}

/// Build scheduling and execution events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuildEvent {
    /// A plan was computed for a set of roots
    PlanReady {
        run_id: String,
        to_build: usize,
        already_installed: usize,
    },

    /// A node had all its dependencies installed and a worker picked it up
    NodeStarted {
        run_id: String,
        package: String,
        version: String,
        hash: String,
    },

    PhaseStarted {
        package: String,
        phase: String,
    },

    /// A configured phase hook ran
    HookRun {
        package: String,
        phase: String,
        stage: String,
        command: String,
    },

    NodeFinished {
        run_id: String,
        package: String,
        hash: String,
        outcome: NodeOutcomeKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        log_path: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<FailureContext>,
    },

    /// Every node of the plan reached a terminal state
    ExecutionFinished {
        run_id: String,
        installed: usize,
        failed: usize,
        skipped: usize,
        cancelled: usize,
        duration_ms: u64,
    },
}
