//! Recipes that drive every step through hooks

use super::{BuildDirs, BuildSystem};
use crate::context::BuildRequest;
use sprig_platform::PlatformCommand;
use sprig_types::{BuildPhase, BuildSystemKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct GenericBuildSystem;

impl BuildSystem for GenericBuildSystem {
    fn kind(&self) -> BuildSystemKind {
        BuildSystemKind::Generic
    }

    fn phase_commands(
        &self,
        _phase: BuildPhase,
        _request: &BuildRequest,
        _dirs: &BuildDirs,
    ) -> Vec<PlatformCommand> {
        Vec::new()
    }
}
