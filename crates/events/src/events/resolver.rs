use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Concretization events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResolverEvent {
    /// Concretization of one request started
    Started { roots: Vec<String> },

    /// A choice point ran out of candidates and the search stepped back
    Backtracked {
        package: String,
        depth: usize,
        reason: String,
    },

    /// A concrete DAG was produced
    Completed {
        nodes: usize,
        steps: u64,
        duration_ms: u64,
    },

    Failed { failure: FailureContext },
}
