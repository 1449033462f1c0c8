//! Types for operations and results

use serde::Serialize;
use sprig_hash::Hash;
use sprig_install::{ExecutionReport, NodeStatus};
use sprig_store::{InstallRecord, InstallStatus};
use sprig_types::Version;
use std::path::PathBuf;

/// One store record as shown by `find`
#[derive(Clone, Debug, Serialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: Version,
    pub hash: Hash,
    pub prefix: PathBuf,
    pub status: InstallStatus,
    /// Requested by the user rather than pulled in as a dependency
    pub explicit: bool,
}

impl From<InstallRecord> for InstalledPackage {
    fn from(record: InstallRecord) -> Self {
        Self {
            name: record.name,
            version: record.version,
            hash: record.hash,
            prefix: record.prefix,
            status: record.status,
            explicit: record.explicit,
        }
    }
}

/// Serializable summary of one executed node
#[derive(Clone, Debug, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub version: Version,
    pub hash: Hash,
    pub status: NodeStatus,
    pub prefix: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failed dependency behind a skip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Hash>,
}

/// Installation report
#[derive(Clone, Debug, Serialize)]
pub struct InstallReport {
    pub run_id: String,
    pub success: bool,
    pub nodes: Vec<NodeSummary>,
    /// Execution time in milliseconds
    pub duration_ms: u64,
}

impl From<&ExecutionReport> for InstallReport {
    fn from(report: &ExecutionReport) -> Self {
        let nodes = report
            .outcomes
            .iter()
            .map(|o| NodeSummary {
                name: o.name.clone(),
                version: o.version.clone(),
                hash: o.hash.clone(),
                status: o.status,
                prefix: o.prefix.clone(),
                log_path: o.log_path.clone(),
                error: o.error.as_ref().map(ToString::to_string),
                cause: o.cause.clone(),
            })
            .collect();
        Self {
            run_id: report.run_id.clone(),
            success: report.is_success(),
            nodes,
            duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
