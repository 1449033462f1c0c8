#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package recipe index for sprig
//!
//! Recipes live in a directory-per-package layout
//! (`<recipes>/<name>/package.toml`). The index is built once per process,
//! passed by reference to the resolver, and never mutated afterwards. A
//! JSON snapshot can be cached to skip re-parsing unchanged recipes.

mod cache;
mod models;

pub use cache::{IndexCache, IndexSnapshot};
pub use models::{
    BuildRecipe, ConflictRule, DependencyRule, HookDecl, PackageRecipeDescriptor, ProvidesRule,
    RecipeFile, VariantDecl, VersionDecl,
};

use sprig_errors::{Error, ResolveError};
use sprig_spec::{Spec, VariantSchema};
use sprig_types::DepTypes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::fs;

/// File name of a recipe inside its package directory
pub const RECIPE_FILE: &str = "package.toml";

/// A dependency edge whose guard holds for a given node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicableDependency {
    pub name: String,
    pub constraint: Spec,
    pub types: DepTypes,
    pub propagate: Vec<String>,
}

/// Read-only lookups over the recipe corpus
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    packages: BTreeMap<String, PackageRecipeDescriptor>,
    /// virtual name -> provider package names, sorted
    providers: BTreeMap<String, Vec<String>>,
}

impl PackageIndex {
    /// Build an index from already validated descriptors
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidRecipe`] if two descriptors share a
    /// name or a package name collides with a virtual. A dependency on an
    /// unknown name is only logged; resolving through it fails later.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = PackageRecipeDescriptor>,
    ) -> Result<Self, Error> {
        let mut packages = BTreeMap::new();
        for desc in descriptors {
            let name = desc.name.clone();
            if packages.insert(name.clone(), desc).is_some() {
                return Err(invalid(&name, "defined twice".to_string()));
            }
        }

        let mut providers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for desc in packages.values() {
            for rule in &desc.provides {
                providers
                    .entry(rule.virtual_name.clone())
                    .or_default()
                    .insert(desc.name.clone());
            }
        }
        if let Some(clash) = providers.keys().find(|v| packages.contains_key(*v)) {
            return Err(invalid(clash, "is both a package and a virtual".to_string()));
        }

        for desc in packages.values() {
            for rule in &desc.dependencies {
                let target = &rule.spec.name;
                if !packages.contains_key(target) && !providers.contains_key(target) {
                    tracing::warn!(
                        package = %desc.name,
                        dependency = %target,
                        "recipe depends on an unknown package"
                    );
                }
            }
        }

        Ok(Self {
            packages,
            providers: providers
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect(),
        })
    }

    /// Load every `<dir>/<name>/package.toml`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or any recipe is
    /// invalid.
    pub async fn load_dir(dir: &Path) -> Result<Self, Error> {
        let mut descriptors = Vec::new();
        for (name, path) in recipe_files(dir).await? {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| Error::io_with_path(&e, &path))?;
            descriptors.push(PackageRecipeDescriptor::from_toml(&name, &content)?);
        }
        tracing::debug!(recipes = descriptors.len(), dir = %dir.display(), "loaded recipes");
        Self::from_descriptors(descriptors)
    }

    /// Load from `cache` when it is newer than every recipe, otherwise
    /// parse `dir` and refresh the cache
    ///
    /// # Errors
    ///
    /// Returns an error if the recipes cannot be loaded. Cache failures are
    /// logged and ignored.
    pub async fn load_dir_cached(dir: &Path, cache: &IndexCache) -> Result<Self, Error> {
        let files = recipe_files(dir).await?;
        let names: Vec<String> = files.iter().map(|(name, _)| name.clone()).collect();
        let newest = newest_mtime(&files).await?;
        match cache.load().await {
            Ok(Some(snapshot)) if snapshot.is_fresh_for(dir, &names, newest) => {
                tracing::debug!(dir = %dir.display(), "using cached recipe index");
                return Self::from_descriptors(snapshot.packages);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable index cache"),
        }

        let index = Self::load_dir(dir).await?;
        let snapshot = IndexSnapshot::new(dir, names, index.packages.values().cloned().collect());
        if let Err(e) = cache.save(&snapshot).await {
            tracing::warn!(error = %e, "failed to write index cache");
        }
        Ok(index)
    }

    /// Look up a package by name
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownPackage`] if no recipe defines `name`.
    pub fn lookup(&self, name: &str) -> Result<&PackageRecipeDescriptor, ResolveError> {
        self.packages
            .get(name)
            .ok_or_else(|| ResolveError::UnknownPackage {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    #[must_use]
    pub fn is_virtual(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Packages that can provide `virtual_name`, sorted by name
    #[must_use]
    pub fn providers(&self, virtual_name: &str) -> &[String] {
        self.providers
            .get(virtual_name)
            .map_or(&[], Vec::as_slice)
    }

    /// True if `spec`, a decided node of a provider package, provides
    /// `virtual_name`
    #[must_use]
    pub fn provides(&self, spec: &Spec, virtual_name: &str) -> bool {
        self.packages.get(&spec.name).is_some_and(|desc| {
            desc.provides.iter().any(|rule| {
                rule.virtual_name == virtual_name
                    && rule.when.as_ref().is_none_or(|w| spec.satisfies(w))
            })
        })
    }

    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PackageRecipeDescriptor> {
        self.packages.values()
    }

    /// Dependency edges of `descriptor` whose `when` guard holds for `spec`
    ///
    /// Guards only see `spec` itself, never its siblings. Repeated edges
    /// to the same package are merged; a merge conflict between two
    /// applicable rules is reported as an unsatisfiable recipe.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnsatisfiableConstraints`] if two applicable
    /// rules of the same recipe contradict each other.
    pub fn applicable_dependencies(
        &self,
        descriptor: &PackageRecipeDescriptor,
        spec: &Spec,
    ) -> Result<Vec<ApplicableDependency>, ResolveError> {
        let mut out: Vec<ApplicableDependency> = Vec::new();
        for rule in &descriptor.dependencies {
            if !rule.when.as_ref().is_none_or(|w| spec.satisfies(w)) {
                continue;
            }
            let mut constraint = rule.spec.clone();
            for variant in &rule.propagate {
                let Some(value) = spec.variants.get(variant) else {
                    continue;
                };
                let declares = self
                    .packages
                    .get(&constraint.name)
                    .is_some_and(|d| d.variants.contains_key(variant));
                if declares && !constraint.variants.contains_key(variant) {
                    constraint.variants.insert(variant.clone(), value.clone());
                }
            }

            if let Some(existing) = out.iter_mut().find(|d| d.name == constraint.name) {
                existing.constraint = existing.constraint.merge_constraints(&constraint).map_err(
                    |e| ResolveError::UnsatisfiableConstraints {
                        conflicts: vec![sprig_errors::ConflictRecord {
                            package: constraint.name.clone(),
                            reason: e.to_string(),
                            origins: vec![descriptor.name.clone()],
                        }],
                    },
                )?;
                existing.types |= rule.types;
                existing.propagate.extend(rule.propagate.iter().cloned());
            } else {
                out.push(ApplicableDependency {
                    name: constraint.name.clone(),
                    constraint,
                    types: rule.types,
                    propagate: rule.propagate.clone(),
                });
            }
        }
        Ok(out)
    }

    /// Recipe conflicts whose guard holds for `spec`
    #[must_use]
    pub fn active_conflicts<'a>(
        &self,
        descriptor: &'a PackageRecipeDescriptor,
        spec: &Spec,
    ) -> Vec<&'a ConflictRule> {
        descriptor
            .conflicts
            .iter()
            .filter(|c| spec.satisfies(&c.when))
            .collect()
    }

    /// Unguarded edges of `name` whose types intersect `mask`
    ///
    /// Used to reject cycles before any choice is made.
    #[must_use]
    pub fn unconditional_dependencies(&self, name: &str, mask: DepTypes) -> Vec<&str> {
        let Some(desc) = self.packages.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = desc
            .dependencies
            .iter()
            .filter(|r| r.when.is_none() && r.types.intersects(mask))
            .map(|r| r.spec.name.as_str())
            .filter(|n| self.packages.contains_key(*n))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

impl VariantSchema for PackageIndex {
    fn declared_variants(&self, package: &str) -> Option<Vec<&str>> {
        self.packages
            .get(package)
            .map(|d| d.variants.keys().map(String::as_str).collect())
    }
}

async fn recipe_files(dir: &Path) -> Result<Vec<(String, std::path::PathBuf)>, Error> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| Error::io_with_path(&e, dir))?;
    let mut out = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_with_path(&e, dir))?
    {
        let path = entry.path().join(RECIPE_FILE);
        if fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            out.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    out.sort();
    Ok(out)
}

async fn newest_mtime(
    files: &[(String, std::path::PathBuf)],
) -> Result<Option<std::time::SystemTime>, Error> {
    let mut newest = None;
    for (_, path) in files {
        let modified = fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| Error::io_with_path(&e, path))?;
        newest = newest.max(Some(modified));
    }
    Ok(newest)
}

fn invalid(package: &str, message: String) -> Error {
    ResolveError::InvalidRecipe {
        package: package.to_string(),
        message,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str, toml: &str) -> PackageRecipeDescriptor {
        PackageRecipeDescriptor::from_toml(name, toml).unwrap()
    }

    fn index() -> PackageIndex {
        PackageIndex::from_descriptors([
            desc(
                "hdf5",
                r#"
[[versions]]
version = "1.14"

[variants.shared]
default = true

[variants.mpi]
default = false

[[dependencies]]
spec = "zlib"
propagate = ["shared"]

[[dependencies]]
spec = "zlib@1.2:"
types = ["run"]

[[dependencies]]
spec = "mpi"
when = "+mpi"
"#,
            ),
            desc(
                "zlib",
                "[[versions]]\nversion = \"1.3\"\n[variants.shared]\ndefault = true\n",
            ),
            desc(
                "openmpi",
                "[[versions]]\nversion = \"5.0\"\n[[provides]]\nvirtual = \"mpi\"\n",
            ),
            desc(
                "mpich",
                "[[versions]]\nversion = \"4.1\"\n[[provides]]\nvirtual = \"mpi\"\nwhen = \"@4:\"\n",
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_unknown() {
        let idx = index();
        assert!(matches!(
            idx.lookup("nope"),
            Err(ResolveError::UnknownPackage { .. })
        ));
    }

    #[test]
    fn test_guards_and_propagation() {
        let idx = index();
        let hdf5 = idx.lookup("hdf5").unwrap();

        let node: Spec = "hdf5@=1.14~shared~mpi".parse().unwrap();
        let deps = idx.applicable_dependencies(hdf5, &node).unwrap();
        assert_eq!(deps.len(), 1);
        let zlib = &deps[0];
        assert_eq!(zlib.types, DepTypes::BUILD_LINK | DepTypes::RUN);
        assert_eq!(zlib.constraint.versions.to_string(), "1.2:");
        assert_eq!(
            zlib.constraint.variants["shared"],
            sprig_types::VariantValue::Bool(false)
        );

        let with_mpi: Spec = "hdf5@=1.14+shared+mpi".parse().unwrap();
        let names: Vec<String> = idx
            .applicable_dependencies(hdf5, &with_mpi)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["zlib", "mpi"]);
    }

    #[test]
    fn test_virtual_providers() {
        let idx = index();
        assert!(idx.is_virtual("mpi"));
        assert_eq!(idx.providers("mpi"), ["mpich", "openmpi"]);
        assert!(idx.provides(&"mpich@=4.1".parse().unwrap(), "mpi"));
        assert!(!idx.provides(&"mpich@=3.4".parse().unwrap(), "mpi"));
    }

    #[test]
    fn test_unknown_dependency_loads() {
        let idx = PackageIndex::from_descriptors([
            desc("app", "[[dependencies]]\nspec = \"ghost\"\n"),
            desc("zlib", "[[versions]]\nversion = \"1.3\"\n"),
        ])
        .unwrap();
        assert!(idx.contains("app"));
        assert!(idx.contains("zlib"));
        assert!(!idx.contains("ghost"));
        assert!(!idx.is_virtual("ghost"));
    }

    #[test]
    fn test_schema_lists_variants() {
        let idx = index();
        assert_eq!(idx.declared_variants("hdf5"), Some(vec!["mpi", "shared"]));
        assert_eq!(idx.declared_variants("missing"), None);
    }
}
