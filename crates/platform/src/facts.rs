//! Host architecture and available compilers

use sprig_errors::Error;
use sprig_types::{ArchSpec, CompilerSpec, Version};

use crate::process::{PlatformCommand, ProcessOperations};

/// Compilers probed by [`PlatformFacts::detect`]: (name, executable)
pub const DEFAULT_COMPILER_CANDIDATES: &[(&str, &str)] = &[("gcc", "gcc"), ("clang", "clang")];

/// What the concretizer knows about the machine it is solving for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformFacts {
    /// Fully pinned `platform-os-target`
    pub arch: ArchSpec,
    /// Available compilers, each with an exact version, most preferred first
    pub compilers: Vec<CompilerSpec>,
}

impl PlatformFacts {
    #[must_use]
    pub fn new(arch: ArchSpec, compilers: Vec<CompilerSpec>) -> Self {
        Self { arch, compilers }
    }

    /// Probe the host
    ///
    /// Compilers that are missing or print an unparseable version are
    /// skipped; a host without compilers is not an error.
    pub async fn detect(process: &dyn ProcessOperations) -> Self {
        let os_release = tokio::fs::read_to_string("/etc/os-release").await.ok();
        let arch = host_arch(os_release.as_deref());

        let mut compilers = Vec::new();
        for (name, exe) in DEFAULT_COMPILER_CANDIDATES {
            match probe_compiler(process, name, exe).await {
                Ok(Some(spec)) => compilers.push(spec),
                Ok(None) => {}
                Err(e) => tracing::debug!(compiler = name, error = %e, "compiler not usable"),
            }
        }
        tracing::debug!(arch = %arch, compilers = compilers.len(), "detected platform");
        Self { arch, compilers }
    }

    /// Reorder compilers by a configured name preference
    ///
    /// Named compilers come first in the given order, the rest keep their
    /// name order; within one name the newest version wins.
    #[must_use]
    pub fn with_compiler_preference(mut self, preferred: &[String]) -> Self {
        let rank = |c: &CompilerSpec| {
            preferred
                .iter()
                .position(|p| p == &c.name)
                .unwrap_or(preferred.len())
        };
        self.compilers.sort_by(|a, b| {
            rank(a)
                .cmp(&rank(b))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| b.version.concrete().cmp(&a.version.concrete()))
        });
        self
    }

    #[must_use]
    pub fn default_compiler(&self) -> Option<&CompilerSpec> {
        self.compilers.first()
    }
}

async fn probe_compiler(
    process: &dyn ProcessOperations,
    name: &str,
    exe: &str,
) -> Result<Option<CompilerSpec>, Error> {
    let path = process.which(exe).await?;
    let mut cmd = PlatformCommand::new(&path.to_string_lossy());
    cmd.arg("-dumpversion");
    let output = process.execute_command(&cmd).await?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(Version::parse(&output.stdout_text())
        .ok()
        .map(|v| CompilerSpec::exact(name, v)))
}

fn host_arch(os_release: Option<&str>) -> ArchSpec {
    let platform = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let os = os_release
        .and_then(parse_os_release)
        .unwrap_or_else(|| platform.to_string());
    ArchSpec::new(platform, &os, std::env::consts::ARCH)
}

/// Derive an os token such as `ubuntu22.04` from `/etc/os-release`
#[must_use]
pub fn parse_os_release(content: &str) -> Option<String> {
    let field = |key: &str| {
        content.lines().find_map(|line| {
            let value = line.strip_prefix(key)?.strip_prefix('=')?;
            Some(value.trim().trim_matches('"').to_string())
        })
    };
    let id = field("ID").filter(|s| !s.is_empty())?;
    let version = field("VERSION_ID").unwrap_or_default();
    // '-' separates arch fields
    Some(format!("{id}{version}").replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_os_release() {
        let text = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n";
        assert_eq!(parse_os_release(text).as_deref(), Some("ubuntu22.04"));
        assert_eq!(
            parse_os_release("ID=opensuse-tumbleweed\n").as_deref(),
            Some("opensuse_tumbleweed")
        );
        assert_eq!(parse_os_release("NAME=foo\n"), None);
    }

    #[test]
    fn test_host_arch_is_concrete() {
        assert!(host_arch(None).is_concrete());
    }

    #[test]
    fn test_compiler_preference() {
        let v = |s: &str| Version::parse(s).unwrap();
        let facts = PlatformFacts::new(
            ArchSpec::new("linux", "ubuntu22.04", "x86_64"),
            vec![
                CompilerSpec::exact("gcc", v("11.4")),
                CompilerSpec::exact("clang", v("15")),
                CompilerSpec::exact("gcc", v("12.3")),
            ],
        )
        .with_compiler_preference(&["gcc".to_string()]);
        let names: Vec<String> = facts.compilers.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["gcc@=12.3", "gcc@=11.4", "clang@=15"]);
    }
}
