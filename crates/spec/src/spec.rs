//! Abstract spec values and constraint operations

use serde::{Deserialize, Serialize};
use sprig_errors::SpecError;
use sprig_hash::Hash;
use sprig_types::{ArchSpec, CompilerSpec, DepTypes, VariantValue, VersionConstraint};
use std::collections::BTreeMap;

use crate::hash::{canonical_hash, CanonicalDep, CanonicalNode};

/// Variant declarations a spec is checked against
///
/// Implemented by the package index; concreteness depends on which
/// variants a package declares.
pub trait VariantSchema {
    /// Names of the variants `package` declares, `None` for unknown packages
    fn declared_variants(&self, package: &str) -> Option<Vec<&str>>;
}

impl VariantSchema for BTreeMap<String, Vec<String>> {
    fn declared_variants(&self, package: &str) -> Option<Vec<&str>> {
        self.get(package)
            .map(|names| names.iter().map(String::as_str).collect())
    }
}

/// Edge from a spec to one of its dependencies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub spec: Spec,
    /// Empty when the edge is only a constraint (`^name` in a request)
    pub types: DepTypes,
}

/// A possibly partial package request
///
/// An empty `name` denotes an anonymous spec, as used for `when` guards
/// (`+shared`, `@1.2:`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    pub name: String,
    #[serde(default)]
    pub versions: VersionConstraint,
    #[serde(default)]
    pub variants: BTreeMap<String, VariantValue>,
    #[serde(default)]
    pub compiler: Option<CompilerSpec>,
    #[serde(default)]
    pub arch: ArchSpec,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

impl Spec {
    /// An unconstrained spec for `name`
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    /// Direct dependency constraint named `name`
    #[must_use]
    pub fn dependency(&self, name: &str) -> Option<&DependencySpec> {
        self.dependencies.iter().find(|d| d.spec.name == name)
    }

    /// Copy without dependency edges
    #[must_use]
    pub fn node_only(&self) -> Self {
        Self {
            dependencies: Vec::new(),
            ..self.clone()
        }
    }

    /// Intersect two specs for the same package
    ///
    /// Every conflicting attribute is reported, not only the first.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::ConflictingConstraints`] when the names differ,
    /// the version constraints are disjoint, a variant is fixed to two
    /// incompatible values, or the compilers or architectures disagree.
    pub fn merge_constraints(&self, other: &Self) -> Result<Self, SpecError> {
        let mut clashes = Vec::new();

        let name = match (self.name.as_str(), other.name.as_str()) {
            ("", n) | (n, "") => n.to_string(),
            (a, b) if a == b => a.to_string(),
            (a, b) => {
                clashes.push((format!("name {a}"), format!("name {b}")));
                a.to_string()
            }
        };

        let versions = self.versions.intersect(&other.versions);
        if versions.is_empty() {
            clashes.push((format!("@{}", self.versions), format!("@{}", other.versions)));
        }

        let mut variants = self.variants.clone();
        for (key, value) in &other.variants {
            match variants.get(key).cloned() {
                None => {
                    variants.insert(key.clone(), value.clone());
                }
                Some(existing) => match existing.merge(value) {
                    Some(merged) => {
                        variants.insert(key.clone(), merged);
                    }
                    None => clashes.push((
                        crate::parse::format_variant(key, &existing),
                        crate::parse::format_variant(key, value),
                    )),
                },
            }
        }

        let compiler = match (&self.compiler, &other.compiler) {
            (Some(a), Some(b)) => {
                if let Some(merged) = a.merge(b) {
                    Some(merged)
                } else {
                    clashes.push((format!("%{a}"), format!("%{b}")));
                    Some(a.clone())
                }
            }
            (a, b) => a.clone().or_else(|| b.clone()),
        };

        let arch = if let Some(merged) = self.arch.merge(&other.arch) {
            merged
        } else {
            clashes.push((format!("arch={}", self.arch), format!("arch={}", other.arch)));
            self.arch.clone()
        };

        let mut dependencies = self.dependencies.clone();
        for dep in &other.dependencies {
            if let Some(existing) = dependencies
                .iter_mut()
                .find(|d| d.spec.name == dep.spec.name)
            {
                match existing.spec.merge_constraints(&dep.spec) {
                    Ok(merged) => {
                        existing.spec = merged;
                        existing.types |= dep.types;
                    }
                    Err(SpecError::ConflictingConstraints { left, right, .. }) => {
                        clashes.push((
                            format!("^{} {left}", dep.spec.name),
                            format!("^{} {right}", dep.spec.name),
                        ));
                    }
                    Err(err) => return Err(err),
                }
            } else {
                dependencies.push(dep.clone());
            }
        }

        if !clashes.is_empty() {
            let (left, right): (Vec<_>, Vec<_>) = clashes.into_iter().unzip();
            return Err(SpecError::ConflictingConstraints {
                package: if name.is_empty() {
                    "<anonymous>".to_string()
                } else {
                    name
                },
                left: left.join(" "),
                right: right.join(" "),
            });
        }

        Ok(Self {
            name,
            versions,
            variants,
            compiler,
            arch,
            dependencies,
        })
    }

    /// True if `self` meets every constraint in `required`
    ///
    /// An anonymous `required` matches any name.
    #[must_use]
    pub fn satisfies(&self, required: &Self) -> bool {
        if !required.is_anonymous() && required.name != self.name {
            return false;
        }
        if !self.versions.satisfies(&required.versions) {
            return false;
        }
        let variants_ok = required.variants.iter().all(|(key, want)| {
            self.variants
                .get(key)
                .is_some_and(|have| have.satisfies(want))
        });
        if !variants_ok {
            return false;
        }
        let compiler_ok = match (&self.compiler, &required.compiler) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(have), Some(want)) => have.satisfies(want),
        };
        if !compiler_ok || !self.arch.satisfies(&required.arch) {
            return false;
        }
        required.dependencies.iter().all(|want| {
            self.dependency(&want.spec.name)
                .is_some_and(|have| have.spec.satisfies(&want.spec))
        })
    }

    /// True if `self` and `required` could describe the same node
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.merge_constraints(other).is_ok()
    }

    /// True when every attribute is pinned
    ///
    /// Requires an exact version, a value for every variant the package
    /// declares, a pinned compiler and architecture, and concrete
    /// dependencies.
    #[must_use]
    pub fn is_concrete(&self, schema: &dyn VariantSchema) -> bool {
        if self.is_anonymous() || self.versions.concrete().is_none() {
            return false;
        }
        if !self.compiler.as_ref().is_some_and(CompilerSpec::is_concrete) {
            return false;
        }
        if !self.arch.is_concrete() {
            return false;
        }
        let Some(declared) = schema.declared_variants(&self.name) else {
            return false;
        };
        if !declared.iter().all(|v| self.variants.contains_key(*v)) {
            return false;
        }
        self.dependencies
            .iter()
            .all(|d| !d.types.is_empty() && d.spec.is_concrete(schema))
    }

    /// Content hash of a concrete spec
    ///
    /// Variants and dependencies are canonicalized first, so construction
    /// order never changes the result. Only build and link edges feed the
    /// hash.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::NotConcrete`] if [`Spec::is_concrete`] is false.
    pub fn compute_hash(&self, schema: &dyn VariantSchema) -> Result<Hash, SpecError> {
        if !self.is_concrete(schema) {
            return Err(SpecError::NotConcrete {
                spec: self.to_string(),
            });
        }
        self.hash_unchecked()
    }

    fn hash_unchecked(&self) -> Result<Hash, SpecError> {
        let mut deps = Vec::new();
        for dep in &self.dependencies {
            if dep.types.is_build_or_link() {
                deps.push(CanonicalDep {
                    name: dep.spec.name.clone(),
                    hash: dep.spec.hash_unchecked()?,
                    types: dep.types & DepTypes::BUILD_LINK,
                });
            }
        }
        let not_concrete = || SpecError::NotConcrete {
            spec: self.to_string(),
        };
        let version = self.versions.concrete().ok_or_else(not_concrete)?;
        let compiler = self.compiler.as_ref().ok_or_else(not_concrete)?;
        Ok(canonical_hash(&CanonicalNode {
            name: &self.name,
            version,
            variants: &self.variants,
            compiler,
            arch: &self.arch,
            dependencies: deps,
        }))
    }
}
