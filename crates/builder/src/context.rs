//! Everything a build needs to know about one node

use crate::hooks::PhaseHooks;
use sprig_index::BuildRecipe;
use sprig_spec::ConcreteNode;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A node ready to build, with paths decided by the caller
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub node: ConcreteNode,
    pub prefix: PathBuf,
    /// Scratch directory for sources and out-of-tree builds
    pub stage_dir: PathBuf,
    pub log_path: PathBuf,
    /// Install prefixes of build and link dependencies, in dependency order
    pub dependency_prefixes: Vec<PathBuf>,
    pub configure_args: Vec<String>,
    pub build_targets: Vec<String>,
    pub hooks: PhaseHooks,
    pub jobs: usize,
}

impl BuildRequest {
    #[must_use]
    pub fn new(node: ConcreteNode, prefix: PathBuf, stage_dir: PathBuf, log_path: PathBuf) -> Self {
        Self {
            node,
            prefix,
            stage_dir,
            log_path,
            dependency_prefixes: Vec::new(),
            configure_args: Vec::new(),
            build_targets: Vec::new(),
            hooks: PhaseHooks::default(),
            jobs: 1,
        }
    }

    /// Copy arguments and hooks from a recipe's `[build]` table
    #[must_use]
    pub fn with_recipe(mut self, recipe: &BuildRecipe) -> Self {
        self.configure_args.clone_from(&recipe.configure_args);
        self.build_targets.clone_from(&recipe.build_targets);
        self.hooks = PhaseHooks::from_recipe(recipe);
        self
    }

    #[must_use]
    pub fn with_dependency_prefixes(mut self, prefixes: Vec<PathBuf>) -> Self {
        self.dependency_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Environment every phase command runs with
    ///
    /// Search paths list dependency prefixes in order and are appended to
    /// whatever the parent process already exports.
    #[must_use]
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("PREFIX".to_string(), self.prefix.display().to_string());
        env.insert("SPRIG_JOBS".to_string(), self.jobs.to_string());
        env.insert("SPRIG_PACKAGE".to_string(), self.node.name.clone());
        env.insert("SPRIG_VERSION".to_string(), self.node.version.to_string());
        env.insert("SPRIG_HASH".to_string(), self.node.hash.to_hex());
        env.insert("CC".to_string(), compiler_driver(&self.node.compiler.name, false));
        env.insert("CXX".to_string(), compiler_driver(&self.node.compiler.name, true));

        let joined = |suffixes: &[&str], inherited: &str| {
            let mut parts: Vec<String> = self
                .dependency_prefixes
                .iter()
                .flat_map(|p| {
                    suffixes.iter().map(move |s| {
                        if s.is_empty() {
                            p.display().to_string()
                        } else {
                            p.join(s).display().to_string()
                        }
                    })
                })
                .collect();
            if let Ok(existing) = std::env::var(inherited) {
                if !existing.is_empty() {
                    parts.push(existing);
                }
            }
            parts.join(":")
        };

        if !self.dependency_prefixes.is_empty() {
            env.insert("CMAKE_PREFIX_PATH".to_string(), joined(&[""], "CMAKE_PREFIX_PATH"));
            env.insert(
                "PKG_CONFIG_PATH".to_string(),
                joined(&["lib/pkgconfig", "share/pkgconfig"], "PKG_CONFIG_PATH"),
            );
            env.insert("PATH".to_string(), joined(&["bin"], "PATH"));
        }
        env
    }
}

fn compiler_driver(name: &str, cxx: bool) -> String {
    match (name, cxx) {
        ("gcc", false) => "gcc".to_string(),
        ("gcc", true) => "g++".to_string(),
        ("clang", false) => "clang".to_string(),
        ("clang", true) => "clang++".to_string(),
        (other, _) => other.to_string(),
    }
}
