#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! High-level operations for sprig
//!
//! This crate is the orchestration layer between the CLI and the engine
//! crates. An [`OpsCtx`] owns the index, platform facts, store and
//! scheduler; the operations here are thin compositions over it.

mod context;
mod operations;
mod query;
mod types;

pub use context::{OpsContextBuilder, OpsCtx};
pub use operations::{concretize, execute, install, load_dag, parse_specs, plan};
pub use query::find;
pub use types::{InstallReport, InstalledPackage, NodeSummary};

use sprig_errors::Error;
use sprig_spec::ConcreteDag;
use std::sync::Arc;

/// Operation result that can be serialized for CLI output
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "type", content = "data")]
pub enum OperationResult {
    /// Canonical forms of parsed specs
    Specs(Vec<String>),
    /// Concrete DAG, serialized in its reloadable JSON form
    ConcreteDag(#[serde(serialize_with = "serialize_dag")] Arc<ConcreteDag>),
    InstallReport(InstallReport),
    PackageList(Vec<InstalledPackage>),
}

impl OperationResult {
    /// Convert to JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::InstallReport(report) => report.success,
            Self::Specs(_) | Self::ConcreteDag(_) | Self::PackageList(_) => true,
        }
    }
}

fn serialize_dag<S>(dag: &Arc<ConcreteDag>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let value: serde_json::Value = serde_json::from_str(&dag.to_json().map_err(serde::ser::Error::custom)?)
        .map_err(serde::ser::Error::custom)?;
    serde::Serialize::serialize(&value, serializer)
}
