use serde::{Deserialize, Serialize};
use std::fmt;

/// Build system a package uses; selects the executor strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystemKind {
    #[serde(rename = "cmake")]
    CMake,
    Autotools,
    Python,
    Makefile,
    #[default]
    Generic,
}

impl fmt::Display for BuildSystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CMake => "cmake",
            Self::Autotools => "autotools",
            Self::Python => "python",
            Self::Makefile => "makefile",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// Phases a build executor runs, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPhase {
    Configure,
    Build,
    Install,
}

impl BuildPhase {
    pub const ALL: [Self; 3] = [Self::Configure, Self::Build, Self::Install];
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Install => "install",
        };
        f.write_str(name)
    }
}

/// Whether a hook runs before or after its phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookStage {
    Before,
    After,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Before => "before",
            Self::After => "after",
        })
    }
}
