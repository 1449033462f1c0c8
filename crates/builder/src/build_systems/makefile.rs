//! Plain Makefile builds

use super::{command_in, jobs_flag, BuildDirs, BuildSystem};
use crate::context::BuildRequest;
use sprig_platform::PlatformCommand;
use sprig_types::{BuildPhase, BuildSystemKind};

/// No configure step; `PREFIX` is passed on the make command line
#[derive(Debug, Clone, Copy, Default)]
pub struct MakefileBuildSystem;

impl BuildSystem for MakefileBuildSystem {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Makefile
    }

    fn phase_commands(
        &self,
        phase: BuildPhase,
        request: &BuildRequest,
        dirs: &BuildDirs,
    ) -> Vec<PlatformCommand> {
        let prefix = format!("PREFIX={}", request.prefix.display());
        match phase {
            BuildPhase::Configure => Vec::new(),
            BuildPhase::Build => {
                let mut args = vec![jobs_flag(request), prefix];
                args.extend(request.build_targets.iter().cloned());
                vec![command_in(&dirs.build_dir, "make", &args)]
            }
            BuildPhase::Install => vec![command_in(
                &dirs.build_dir,
                "make",
                &[prefix, "install".to_string()],
            )],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_systems::test_support::{argv, request};
    use std::path::Path;

    #[test]
    fn test_configure_is_noop() {
        let request = request(BuildSystemKind::Makefile);
        let system = MakefileBuildSystem;
        let dirs = system.dirs(Path::new("/src"), Path::new("/stage"));
        assert!(system
            .phase_commands(BuildPhase::Configure, &request, &dirs)
            .is_empty());
        let install = argv(&system.phase_commands(BuildPhase::Install, &request, &dirs)[0]);
        assert_eq!(install, ["make", "PREFIX=/opt/sprig/demo", "install"]);
    }
}
