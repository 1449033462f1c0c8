//! Configuration sections

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Terminal color policy for the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    Always,
    #[default]
    Auto,
    Never,
}

/// General application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Parallel jobs handed to each build (`make -j`); 0 = auto-detect
    pub jobs: usize,
    pub color: ColorChoice,
}

/// Concretizer preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Compiler names in preference order, e.g. `["gcc", "clang"]`
    pub compilers: Vec<String>,
    /// Virtual package -> preferred providers, most preferred first
    pub providers: BTreeMap<String, Vec<String>>,
    /// Candidate assignments tried before giving up
    pub max_steps: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            compilers: Vec::new(),
            providers: BTreeMap::new(),
            max_steps: 100_000,
        }
    }
}

/// Installer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    pub root: Option<PathBuf>,
    /// How long to wait for another process's per-hash lock
    pub lock_timeout_secs: u64,
    pub fail_fast: bool,
    /// Leave a failed build's prefix in place for inspection
    pub keep_prefix: bool,
    /// Concurrent builds; 0 = auto-detect
    pub max_parallelism: usize,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            root: None,
            lock_timeout_secs: 600, // 10 minutes
            fail_fast: false,
            keep_prefix: false,
            max_parallelism: 0,
        }
    }
}

/// Path configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub recipes: Option<PathBuf>,
    /// Local directory holding source archives or trees per package
    pub mirror: Option<PathBuf>,
    pub cache: Option<PathBuf>,
}
