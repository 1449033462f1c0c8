//! Python packages installed with pip

use super::{command_in, BuildDirs, BuildSystem};
use crate::context::BuildRequest;
use sprig_platform::PlatformCommand;
use sprig_types::{BuildPhase, BuildSystemKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct PythonBuildSystem;

impl BuildSystem for PythonBuildSystem {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Python
    }

    fn phase_commands(
        &self,
        phase: BuildPhase,
        request: &BuildRequest,
        dirs: &BuildDirs,
    ) -> Vec<PlatformCommand> {
        match phase {
            BuildPhase::Configure | BuildPhase::Build => Vec::new(),
            BuildPhase::Install => {
                let mut args: Vec<String> = [
                    "-m",
                    "pip",
                    "install",
                    "--no-deps",
                    "--no-build-isolation",
                    "--no-index",
                ]
                .iter()
                .map(ToString::to_string)
                .collect();
                args.push(format!("--prefix={}", request.prefix.display()));
                args.extend(request.configure_args.iter().cloned());
                args.push(".".to_string());
                vec![command_in(&dirs.source_dir, "python3", &args)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_systems::test_support::{argv, request};
    use std::path::Path;

    #[test]
    fn test_only_install_runs() {
        let request = request(BuildSystemKind::Python);
        let system = PythonBuildSystem;
        let dirs = system.dirs(Path::new("/src"), Path::new("/stage"));
        assert!(system
            .phase_commands(BuildPhase::Build, &request, &dirs)
            .is_empty());
        let args = argv(&system.phase_commands(BuildPhase::Install, &request, &dirs)[0]);
        assert_eq!(args[0], "python3");
        assert!(args.contains(&"--prefix=/opt/sprig/demo".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("."));
    }
}
