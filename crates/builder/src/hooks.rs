//! Per-phase hook lists
//!
//! Hooks come from a recipe's `[[build.hooks]]` entries and are grouped by
//! phase and stage once, when the build is planned. Declaration order is
//! kept within each group.

use sprig_index::BuildRecipe;
use sprig_types::{BuildPhase, HookStage};
use std::collections::BTreeMap;

/// One hook command as argv
pub type HookCommand = Vec<String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseHooks {
    before: BTreeMap<BuildPhase, Vec<HookCommand>>,
    after: BTreeMap<BuildPhase, Vec<HookCommand>>,
}

impl PhaseHooks {
    #[must_use]
    pub fn from_recipe(recipe: &BuildRecipe) -> Self {
        let mut hooks = Self::default();
        for hook in &recipe.hooks {
            hooks.push(hook.phase, hook.stage, hook.command.clone());
        }
        hooks
    }

    pub fn push(&mut self, phase: BuildPhase, stage: HookStage, command: HookCommand) {
        let table = match stage {
            HookStage::Before => &mut self.before,
            HookStage::After => &mut self.after,
        };
        table.entry(phase).or_default().push(command);
    }

    #[must_use]
    pub fn get(&self, phase: BuildPhase, stage: HookStage) -> &[HookCommand] {
        let table = match stage {
            HookStage::Before => &self.before,
            HookStage::After => &self.after,
        };
        table.get(&phase).map_or(&[][..], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_index::HookDecl;

    #[test]
    fn test_grouped_in_declaration_order() {
        let recipe = BuildRecipe {
            hooks: vec![
                HookDecl {
                    phase: BuildPhase::Install,
                    stage: HookStage::After,
                    command: vec!["strip".into(), "bin/tool".into()],
                },
                HookDecl {
                    phase: BuildPhase::Configure,
                    stage: HookStage::Before,
                    command: vec!["./autogen.sh".into()],
                },
                HookDecl {
                    phase: BuildPhase::Install,
                    stage: HookStage::After,
                    command: vec!["rm".into(), "-rf".into(), "share/doc".into()],
                },
            ],
            ..BuildRecipe::default()
        };
        let hooks = PhaseHooks::from_recipe(&recipe);

        assert_eq!(
            hooks.get(BuildPhase::Configure, HookStage::Before),
            [vec!["./autogen.sh".to_string()]]
        );
        let after_install = hooks.get(BuildPhase::Install, HookStage::After);
        assert_eq!(after_install.len(), 2);
        assert_eq!(after_install[0][0], "strip");
        assert!(hooks.get(BuildPhase::Build, HookStage::Before).is_empty());
    }
}
