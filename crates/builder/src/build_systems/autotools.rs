//! Autotools build system implementation

use super::{command_in, jobs_flag, BuildDirs, BuildSystem};
use crate::context::BuildRequest;
use sprig_platform::PlatformCommand;
use sprig_types::{BuildPhase, BuildSystemKind};

/// `./configure && make && make install`
#[derive(Debug, Clone, Copy, Default)]
pub struct AutotoolsBuildSystem;

impl BuildSystem for AutotoolsBuildSystem {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Autotools
    }

    fn phase_commands(
        &self,
        phase: BuildPhase,
        request: &BuildRequest,
        dirs: &BuildDirs,
    ) -> Vec<PlatformCommand> {
        match phase {
            BuildPhase::Configure => {
                let script = dirs.source_dir.join("configure");
                let mut args = Vec::new();
                if !request
                    .configure_args
                    .iter()
                    .any(|arg| arg.starts_with("--prefix="))
                {
                    args.push(format!("--prefix={}", request.prefix.display()));
                }
                args.extend(request.configure_args.iter().cloned());
                vec![command_in(
                    &dirs.build_dir,
                    &script.display().to_string(),
                    &args,
                )]
            }
            BuildPhase::Build => {
                let mut args = vec![jobs_flag(request)];
                args.extend(request.build_targets.iter().cloned());
                vec![command_in(&dirs.build_dir, "make", &args)]
            }
            BuildPhase::Install => vec![command_in(
                &dirs.build_dir,
                "make",
                &["install".to_string()],
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
    fn test_configure_sets_prefix_once() {
        let mut request = request(BuildSystemKind::Autotools);
        request.configure_args = vec!["--disable-static".to_string()];
        let system = AutotoolsBuildSystem;
        let dirs = system.dirs(Path::new("/stage/src"), Path::new("/stage"));

        let args = argv(&system.phase_commands(BuildPhase::Configure, &request, &dirs)[0]);
        assert_eq!(
            args,
            ["/stage/src/configure", "--prefix=/opt/sprig/demo", "--disable-static"]
        );

        request.configure_args = vec!["--prefix=/elsewhere".to_string()];
        let args = argv(&system.phase_commands(BuildPhase::Configure, &request, &dirs)[0]);
        assert_eq!(args, ["/stage/src/configure", "--prefix=/elsewhere"]);
    }

    #[test]
    fn test_make_phases() {
        let request = request(BuildSystemKind::Autotools);
        let system = AutotoolsBuildSystem;
        let dirs = system.dirs(Path::new("/src"), Path::new("/stage"));
        let build = argv(&system.phase_commands(BuildPhase::Build, &request, &dirs)[0]);
        assert_eq!(build, ["make", "-j8"]);
        let install = argv(&system.phase_commands(BuildPhase::Install, &request, &dirs)[0]);
        assert_eq!(install, ["make", "install"]);
    }
}
