//! Compiler and architecture descriptors

use crate::version::{Version, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compiler name plus a version constraint (`gcc@12`, `clang@=17.0.6`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilerSpec {
    pub name: String,
    #[serde(default)]
    pub version: VersionConstraint,
}

impl CompilerSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, version: VersionConstraint) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// A fully pinned compiler
    #[must_use]
    pub fn exact(name: impl Into<String>, version: Version) -> Self {
        Self::new(name, VersionConstraint::exact(version))
    }

    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.version.concrete().is_some()
    }

    /// Combine two requirements; `None` if the names differ or the
    /// versions are disjoint
    #[must_use]
    pub fn merge(&self, other: &Self) -> Option<Self> {
        if self.name != other.name {
            return None;
        }
        let version = self.version.intersect(&other.version);
        (!version.is_empty()).then(|| Self::new(self.name.clone(), version))
    }

    #[must_use]
    pub fn satisfies(&self, required: &Self) -> bool {
        self.name == required.name && self.version.satisfies(&required.version)
    }
}

impl fmt::Display for CompilerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_any() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}@{}", self.name, self.version)
        }
    }
}

/// Platform, operating system and target; each may be unconstrained
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ArchSpec {
    #[must_use]
    pub fn new(platform: &str, os: &str, target: &str) -> Self {
        Self {
            platform: Some(platform.to_string()),
            os: Some(os.to_string()),
            target: Some(target.to_string()),
        }
    }

    /// Parse a `platform-os-target` triple
    #[must_use]
    pub fn parse_triple(triple: &str) -> Option<Self> {
        let mut parts = triple.splitn(3, '-');
        let platform = parts.next().filter(|s| !s.is_empty())?;
        let os = parts.next().filter(|s| !s.is_empty())?;
        let target = parts.next().filter(|s| !s.is_empty())?;
        Some(Self::new(platform, os, target))
    }

    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.platform.is_some() && self.os.is_some() && self.target.is_some()
    }

    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.platform.is_none() && self.os.is_none() && self.target.is_none()
    }

    /// Field-wise merge; `None` if any field is fixed to two values
    #[must_use]
    pub fn merge(&self, other: &Self) -> Option<Self> {
        fn field(a: Option<&String>, b: Option<&String>) -> Result<Option<String>, ()> {
            match (a, b) {
                (Some(x), Some(y)) if x != y => Err(()),
                (x, y) => Ok(x.or(y).cloned()),
            }
        }
        Some(Self {
            platform: field(self.platform.as_ref(), other.platform.as_ref()).ok()?,
            os: field(self.os.as_ref(), other.os.as_ref()).ok()?,
            target: field(self.target.as_ref(), other.target.as_ref()).ok()?,
        })
    }

    #[must_use]
    pub fn satisfies(&self, required: &Self) -> bool {
        let ok = |have: Option<&String>, want: Option<&String>| {
            want.is_none_or(|w| have == Some(w))
        };
        ok(self.platform.as_ref(), required.platform.as_ref())
            && ok(self.os.as_ref(), required.os.as_ref())
            && ok(self.target.as_ref(), required.target.as_ref())
    }
}

impl fmt::Display for ArchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: Option<&String>| p.map_or("*", String::as_str).to_string();
        write!(
            f,
            "{}-{}-{}",
            part(self.platform.as_ref()),
            part(self.os.as_ref()),
            part(self.target.as_ref())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_merge() {
        let any_gcc = CompilerSpec::new("gcc", VersionConstraint::Any);
        let gcc12: CompilerSpec = CompilerSpec::new("gcc", "12".parse().unwrap());
        assert_eq!(any_gcc.merge(&gcc12), Some(gcc12.clone()));
        assert!(gcc12
            .merge(&CompilerSpec::new("clang", VersionConstraint::Any))
            .is_none());
        assert!(gcc12
            .merge(&CompilerSpec::new("gcc", "=13.1".parse().unwrap()))
            .is_none());
        assert_eq!(gcc12.to_string(), "gcc@12");
    }

    #[test]
    fn test_arch_merge_and_display() {
        let partial = ArchSpec {
            platform: Some("linux".into()),
            ..ArchSpec::default()
        };
        let full = ArchSpec::parse_triple("linux-ubuntu22.04-x86_64").unwrap();
        assert_eq!(partial.merge(&full), Some(full.clone()));
        assert!(full.satisfies(&partial));
        assert!(!partial.satisfies(&full));
        assert_eq!(partial.to_string(), "linux-*-*");

        let darwin = ArchSpec {
            platform: Some("darwin".into()),
            ..ArchSpec::default()
        };
        assert!(darwin.merge(&full).is_none());
    }
}
