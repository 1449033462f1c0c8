#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Build graph scheduling for sprig
//!
//! [`BuildGraphScheduler::plan`] turns a concrete DAG into a topologically
//! ordered [`BuildPlan`], pruning hashes the store already has.
//! [`BuildGraphScheduler::execute`] builds the rest with bounded
//! parallelism. Each node holds its hash lock for the duration of its build
//! so concurrent processes sharing an install root never build the same
//! hash twice.
//!
//! Per-node results are data: a failed build marks its transitive
//! dependents [`NodeStatus::SkippedDueToDependencyFailure`] and lets
//! unrelated subtrees carry on.

mod options;
mod plan;
mod result;
mod scheduler;

pub use options::ExecuteOptions;
pub use plan::{BuildPlan, PlanAction, PlannedNode};
pub use result::{ExecutionReport, NodeOutcome, NodeStatus};
pub use scheduler::BuildGraphScheduler;

/// Handle for [`ExecuteOptions::cancel`]
pub use tokio_util::sync::CancellationToken;
