//! Build system strategies
//!
//! Each strategy turns a [`BuildRequest`] into the commands of the
//! configure, build and install phases. The executor picks the strategy
//! from the node's [`BuildSystemKind`] tag; strategies never run anything
//! themselves.

use crate::context::BuildRequest;
use sprig_platform::PlatformCommand;
use sprig_types::{BuildPhase, BuildSystemKind};
use std::path::{Path, PathBuf};

mod autotools;
mod cmake;
mod generic;
mod makefile;
mod python;

pub use autotools::AutotoolsBuildSystem;
pub use cmake::CMakeBuildSystem;
pub use generic::GenericBuildSystem;
pub use makefile::MakefileBuildSystem;
pub use python::PythonBuildSystem;

/// Directories a strategy works in
#[derive(Debug, Clone)]
pub struct BuildDirs {
    pub source_dir: PathBuf,
    /// Equal to `source_dir` for in-source builds
    pub build_dir: PathBuf,
}

/// Common `{configure, build, install}` capability
pub trait BuildSystem: Send + Sync {
    fn kind(&self) -> BuildSystemKind;

    /// Commands for one phase, in order; empty when the phase is a no-op
    fn phase_commands(
        &self,
        phase: BuildPhase,
        request: &BuildRequest,
        dirs: &BuildDirs,
    ) -> Vec<PlatformCommand>;

    fn prefers_out_of_source_build(&self) -> bool {
        false
    }

    fn build_directory_name(&self) -> &'static str {
        "build"
    }

    /// Working directories for a source tree
    fn dirs(&self, source_dir: &Path, stage_dir: &Path) -> BuildDirs {
        let build_dir = if self.prefers_out_of_source_build() {
            stage_dir.join(self.build_directory_name())
        } else {
            source_dir.to_path_buf()
        };
        BuildDirs {
            source_dir: source_dir.to_path_buf(),
            build_dir,
        }
    }
}

/// Strategy for a build-system tag
#[must_use]
pub fn strategy_for(kind: BuildSystemKind) -> Box<dyn BuildSystem> {
    match kind {
        BuildSystemKind::CMake => Box::new(CMakeBuildSystem),
        BuildSystemKind::Autotools => Box::new(AutotoolsBuildSystem),
        BuildSystemKind::Makefile => Box::new(MakefileBuildSystem),
        BuildSystemKind::Python => Box::new(PythonBuildSystem),
        BuildSystemKind::Generic => Box::new(GenericBuildSystem),
    }
}

/// A command running in `dir`
pub(crate) fn command_in(dir: &Path, program: &str, args: &[String]) -> PlatformCommand {
    let mut cmd = PlatformCommand::new(program);
    cmd.args(args).current_dir(dir);
    cmd
}

/// `make`-style parallelism flag
pub(crate) fn jobs_flag(request: &BuildRequest) -> String {
    format!("-j{}", request.jobs)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use sprig_spec::{ConcreteNode, DagBuilder, NodeDraft};
    use sprig_types::{ArchSpec, CompilerSpec, Version};
    use std::collections::BTreeMap;

    pub fn request(kind: BuildSystemKind) -> BuildRequest {
        let mut builder = DagBuilder::new();
        let id = builder.add_node(NodeDraft {
            name: "demo".to_string(),
            version: Version::parse("1.0").unwrap(),
            variants: BTreeMap::new(),
            compiler: CompilerSpec::exact("gcc", Version::parse("12.3").unwrap()),
            arch: ArchSpec::new("linux", "ubuntu22.04", "x86_64"),
            build_system: kind,
        });
        let node: ConcreteNode = builder.finish(&[id]).unwrap().node(id).clone();
        BuildRequest::new(
            node,
            PathBuf::from("/opt/sprig/demo"),
            PathBuf::from("/stage/demo"),
            PathBuf::from("/logs/demo.log"),
        )
        .with_jobs(8)
    }

    pub fn argv(cmd: &PlatformCommand) -> Vec<String> {
        std::iter::once(cmd.program().to_string())
            .chain(cmd.get_args().iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_matches_tag() {
        for kind in [
            BuildSystemKind::CMake,
            BuildSystemKind::Autotools,
            BuildSystemKind::Makefile,
            BuildSystemKind::Python,
            BuildSystemKind::Generic,
        ] {
            assert_eq!(strategy_for(kind).kind(), kind);
        }
    }

    #[test]
    fn test_out_of_source_dirs() {
        let cmake = strategy_for(BuildSystemKind::CMake);
        let dirs = cmake.dirs(Path::new("/stage/src"), Path::new("/stage"));
        assert_eq!(dirs.build_dir, PathBuf::from("/stage/build"));

        let make = strategy_for(BuildSystemKind::Makefile);
        let dirs = make.dirs(Path::new("/stage/src"), Path::new("/stage"));
        assert_eq!(dirs.build_dir, dirs.source_dir);
    }
}
