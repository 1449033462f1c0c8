//! CMake build system implementation

use super::{command_in, BuildDirs, BuildSystem};
use crate::context::BuildRequest;
use sprig_platform::PlatformCommand;
use sprig_types::{BuildPhase, BuildSystemKind};

const DEFAULT_CONFIGURE_ARGS: &[&str] = &[
    "-DCMAKE_BUILD_TYPE=Release",
    "-DCMAKE_FIND_PACKAGE_PREFER_CONFIG=ON",
];

/// Out-of-source CMake builds
#[derive(Debug, Clone, Copy, Default)]
pub struct CMakeBuildSystem;

impl CMakeBuildSystem {
    fn configure_args(request: &BuildRequest, dirs: &BuildDirs) -> Vec<String> {
        let user = &request.configure_args;
        let overridden = |flag: &str| {
            let key = flag.split('=').next().unwrap_or(flag);
            user.iter().any(|arg| arg.starts_with(key))
        };

        let mut args = vec![
            "-S".to_string(),
            dirs.source_dir.display().to_string(),
            "-B".to_string(),
            dirs.build_dir.display().to_string(),
        ];
        if !overridden("-DCMAKE_INSTALL_PREFIX=") {
            args.push(format!("-DCMAKE_INSTALL_PREFIX={}", request.prefix.display()));
        }
        for default in DEFAULT_CONFIGURE_ARGS {
            if !overridden(default) {
                args.push((*default).to_string());
            }
        }
        if !request.dependency_prefixes.is_empty() && !overridden("-DCMAKE_PREFIX_PATH=") {
            let paths: Vec<String> = request
                .dependency_prefixes
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            args.push(format!("-DCMAKE_PREFIX_PATH={}", paths.join(";")));
        }
        args.extend(user.iter().cloned());
        args
    }
}

impl BuildSystem for CMakeBuildSystem {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::CMake
    }

    fn prefers_out_of_source_build(&self) -> bool {
        true
    }

    fn phase_commands(
        &self,
        phase: BuildPhase,
        request: &BuildRequest,
        dirs: &BuildDirs,
    ) -> Vec<PlatformCommand> {
        match phase {
            BuildPhase::Configure => vec![command_in(
                &dirs.build_dir,
                "cmake",
                &Self::configure_args(request, dirs),
            )],
            BuildPhase::Build => {
                let mut args = vec![
                    "--build".to_string(),
                    dirs.build_dir.display().to_string(),
                    "--parallel".to_string(),
                    request.jobs.to_string(),
                ];
                for target in &request.build_targets {
                    args.push("--target".to_string());
                    args.push(target.clone());
                }
                vec![command_in(&dirs.build_dir, "cmake", &args)]
            }
            BuildPhase::Install => vec![command_in(
                &dirs.build_dir,
                "cmake",
                &["--install".to_string(), dirs.build_dir.display().to_string()],
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
    fn test_configure_defaults_and_overrides() {
        let mut request = request(BuildSystemKind::CMake)
            .with_dependency_prefixes(vec!["/opt/sprig/zlib".into(), "/opt/sprig/xz".into()]);
        request.configure_args = vec!["-DCMAKE_BUILD_TYPE=Debug".to_string()];
        let system = CMakeBuildSystem;
        let dirs = system.dirs(Path::new("/stage/demo/src"), Path::new("/stage/demo"));

        let cmds = system.phase_commands(BuildPhase::Configure, &request, &dirs);
        let args = argv(&cmds[0]);
        assert_eq!(args[0], "cmake");
        assert!(args.contains(&"-DCMAKE_INSTALL_PREFIX=/opt/sprig/demo".to_string()));
        assert!(args.contains(&"-DCMAKE_PREFIX_PATH=/opt/sprig/zlib;/opt/sprig/xz".to_string()));
        assert!(args.contains(&"-DCMAKE_BUILD_TYPE=Debug".to_string()));
        assert!(!args.contains(&"-DCMAKE_BUILD_TYPE=Release".to_string()));
        assert_eq!(cmds[0].get_current_dir(), Some(Path::new("/stage/demo/build")));
    }

    #[test]
    fn test_build_uses_jobs_and_targets() {
        let mut request = request(BuildSystemKind::CMake);
        request.build_targets = vec!["lib".to_string()];
        let system = CMakeBuildSystem;
        let dirs = system.dirs(Path::new("/src"), Path::new("/stage"));
        let args = argv(&system.phase_commands(BuildPhase::Build, &request, &dirs)[0]);
        assert_eq!(
            args,
            ["cmake", "--build", "/stage/build", "--parallel", "8", "--target", "lib"]
        );
    }
}
