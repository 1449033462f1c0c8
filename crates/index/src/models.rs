//! Recipe data models
//!
//! `Recipe*` types mirror the on-disk `package.toml`; they are validated
//! into a [`PackageRecipeDescriptor`] before the resolver sees them.

use serde::{Deserialize, Serialize};
use sprig_errors::{Error, ResolveError};
use sprig_hash::Hash;
use sprig_spec::Spec;
use sprig_types::{
    BuildPhase, BuildSystemKind, DepTypes, HookStage, VariantValue, Version, VersionConstraint,
    VersionItem,
};
use std::collections::{BTreeMap, BTreeSet};

/// Raw `package.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub build_system: BuildSystemKind,
    #[serde(default)]
    pub versions: Vec<RecipeVersion>,
    #[serde(default)]
    pub variants: BTreeMap<String, RecipeVariant>,
    #[serde(default)]
    pub dependencies: Vec<RecipeDependency>,
    #[serde(default)]
    pub conflicts: Vec<RecipeConflict>,
    #[serde(default)]
    pub provides: Vec<RecipeProvides>,
    #[serde(default)]
    pub build: RecipeBuild,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeVersion {
    pub version: String,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub preferred: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeVariant {
    pub default: VariantValue,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub multi: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeDependency {
    pub spec: String,
    #[serde(default)]
    pub types: Option<DepTypes>,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub propagate: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeConflict {
    pub when: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeProvides {
    #[serde(rename = "virtual")]
    pub virtual_name: String,
    #[serde(default)]
    pub when: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeBuild {
    #[serde(default)]
    pub configure_args: Vec<String>,
    #[serde(default)]
    pub build_targets: Vec<String>,
    #[serde(default)]
    pub hooks: Vec<RecipeHook>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeHook {
    pub phase: BuildPhase,
    pub stage: HookStage,
    pub command: Vec<String>,
}

/// A declared version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDecl {
    pub version: Version,
    pub checksum: Option<Hash>,
    pub deprecated: bool,
    pub preferred: bool,
}

/// A declared variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: String,
    pub default: VariantValue,
    /// Allowed tokens; empty for boolean variants
    pub values: Vec<String>,
    pub multi: bool,
}

impl VariantDecl {
    #[must_use]
    pub fn is_bool(&self) -> bool {
        matches!(self.default, VariantValue::Bool(_))
    }

    /// True if `value` is a legal assignment for this variant
    #[must_use]
    pub fn allows(&self, value: &VariantValue) -> bool {
        match value {
            VariantValue::Bool(_) => self.is_bool(),
            VariantValue::Single(token) => !self.is_bool() && self.values.contains(token),
            VariantValue::Multi(tokens) => {
                self.multi && !tokens.is_empty() && tokens.iter().all(|t| self.values.contains(t))
            }
        }
    }

    /// Normalize a requested value to this variant's shape
    #[must_use]
    pub fn normalize(&self, value: VariantValue) -> VariantValue {
        if self.multi {
            value.into_multi()
        } else {
            value
        }
    }

    /// Values to try, default first, then the alternatives in token order
    #[must_use]
    pub fn candidates(&self) -> Vec<VariantValue> {
        let mut out = vec![self.default.clone()];
        match &self.default {
            VariantValue::Bool(b) => out.push(VariantValue::Bool(!b)),
            VariantValue::Single(default) => {
                let mut rest: Vec<&String> = self.values.iter().filter(|v| *v != default).collect();
                rest.sort();
                out.extend(rest.into_iter().map(|v| VariantValue::Single(v.clone())));
            }
            // Every subset is legal; only the default is offered unless a
            // constraint asks for something else.
            VariantValue::Multi(_) => {}
        }
        out
    }
}

/// A conditional dependency edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRule {
    pub spec: Spec,
    pub types: DepTypes,
    /// Anonymous guard evaluated against the dependent node
    pub when: Option<Spec>,
    /// Variants copied from the dependent when the dependency declares them
    pub propagate: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRule {
    pub when: Spec,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidesRule {
    pub virtual_name: String,
    pub when: Option<Spec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookDecl {
    pub phase: BuildPhase,
    pub stage: HookStage,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecipe {
    pub configure_args: Vec<String>,
    pub build_targets: Vec<String>,
    pub hooks: Vec<HookDecl>,
}

/// Validated, read-only package metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecipeDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub build_system: BuildSystemKind,
    /// Newest first
    pub versions: Vec<VersionDecl>,
    pub variants: BTreeMap<String, VariantDecl>,
    pub dependencies: Vec<DependencyRule>,
    pub conflicts: Vec<ConflictRule>,
    pub provides: Vec<ProvidesRule>,
    pub build: BuildRecipe,
}

impl PackageRecipeDescriptor {
    /// Parse and validate a `package.toml`
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidRecipe`] for TOML errors, malformed
    /// versions or specs, duplicate versions, or inconsistent variants.
    pub fn from_toml(default_name: &str, content: &str) -> Result<Self, Error> {
        let raw: RecipeFile = toml::from_str(content).map_err(|e| invalid(default_name, e.to_string()))?;
        Self::from_raw(default_name, raw)
    }

    /// Validate a parsed recipe
    ///
    /// # Errors
    ///
    /// See [`PackageRecipeDescriptor::from_toml`].
    pub fn from_raw(default_name: &str, raw: RecipeFile) -> Result<Self, Error> {
        let name = raw.name.unwrap_or_else(|| default_name.to_string());

        let mut versions = Vec::with_capacity(raw.versions.len());
        let mut seen = BTreeSet::new();
        for entry in raw.versions {
            let version =
                Version::parse(&entry.version).map_err(|e| invalid(&name, e.to_string()))?;
            if !seen.insert(version.clone()) {
                return Err(invalid(&name, format!("version {version} declared twice")));
            }
            let checksum = entry
                .checksum
                .as_deref()
                .map(Hash::from_hex)
                .transpose()
                .map_err(|e| invalid(&name, format!("checksum for {version}: {e}")))?;
            versions.push(VersionDecl {
                version,
                checksum,
                deprecated: entry.deprecated,
                preferred: entry.preferred,
            });
        }
        versions.sort_by(|a, b| b.version.cmp(&a.version));

        let mut variants = BTreeMap::new();
        for (vname, decl) in raw.variants {
            let default = if decl.multi {
                decl.default.into_multi()
            } else {
                decl.default
            };
            let variant = VariantDecl {
                name: vname.clone(),
                default,
                values: decl.values,
                multi: decl.multi,
            };
            if !variant.allows(&variant.default) {
                return Err(invalid(
                    &name,
                    format!("default of variant {vname} is not one of its values"),
                ));
            }
            variants.insert(vname, variant);
        }

        let parse_anon = |text: &str, what: &str| -> Result<Spec, Error> {
            let spec: Spec = text
                .parse()
                .map_err(|e| invalid(&name, format!("{what} `{text}`: {e}")))?;
            if !spec.is_anonymous() && spec.name != name {
                return Err(invalid(&name, format!("{what} `{text}` names another package")));
            }
            if !spec.dependencies.is_empty() {
                return Err(invalid(
                    &name,
                    format!("{what} `{text}` may only constrain {name} itself"),
                ));
            }
            Ok(spec)
        };

        let mut dependencies = Vec::with_capacity(raw.dependencies.len());
        for dep in raw.dependencies {
            let spec: Spec = dep
                .spec
                .parse()
                .map_err(|e| invalid(&name, format!("dependency `{}`: {e}", dep.spec)))?;
            if spec.is_anonymous() || !spec.dependencies.is_empty() {
                return Err(invalid(
                    &name,
                    format!("dependency `{}` must name a single package", dep.spec),
                ));
            }
            let when = dep.when.as_deref().map(|w| parse_anon(w, "when")).transpose()?;
            for variant in &dep.propagate {
                if !variants.contains_key(variant) {
                    return Err(invalid(&name, format!("cannot propagate undeclared variant {variant}")));
                }
            }
            let types = dep.types.unwrap_or_default();
            if types.is_empty() {
                return Err(invalid(&name, format!("dependency `{}` has no types", dep.spec)));
            }
            dependencies.push(DependencyRule {
                spec,
                types,
                when,
                propagate: dep.propagate,
            });
        }

        let conflicts = raw
            .conflicts
            .into_iter()
            .map(|c| {
                let when = parse_anon(&c.when, "conflict")?;
                let message = c
                    .message
                    .unwrap_or_else(|| format!("{name} conflicts with `{}`", c.when));
                Ok(ConflictRule { when, message })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let provides = raw
            .provides
            .into_iter()
            .map(|p| {
                let when = p.when.as_deref().map(|w| parse_anon(w, "provides")).transpose()?;
                Ok(ProvidesRule {
                    virtual_name: p.virtual_name,
                    when,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self {
            name,
            description: raw.description,
            homepage: raw.homepage,
            build_system: raw.build_system,
            versions,
            variants,
            dependencies,
            conflicts,
            provides,
            build: BuildRecipe {
                configure_args: raw.build.configure_args,
                build_targets: raw.build.build_targets,
                hooks: raw
                    .build
                    .hooks
                    .into_iter()
                    .map(|h| HookDecl {
                        phase: h.phase,
                        stage: h.stage,
                        command: h.command,
                    })
                    .collect(),
            },
        })
    }

    #[must_use]
    pub fn version(&self, version: &Version) -> Option<&VersionDecl> {
        self.versions.iter().find(|v| &v.version == version)
    }

    /// Declared versions allowed by `constraint`, in preference order
    ///
    /// Preferred versions come first, then numbered releases newest first,
    /// then branch versions such as `develop`. Deprecated versions are
    /// only offered when the constraint pins a version.
    #[must_use]
    pub fn version_candidates(&self, constraint: &VersionConstraint) -> Vec<&VersionDecl> {
        let pinned = is_pinned(constraint);
        let mut out: Vec<&VersionDecl> = self
            .versions
            .iter()
            .filter(|v| constraint.contains(&v.version))
            .filter(|v| pinned || !v.deprecated)
            .collect();
        // versions are already newest first; the sort is stable
        out.sort_by_key(|v| (!v.preferred, v.version.is_infinity(), v.deprecated));
        out
    }
}

/// True if every item names a single release (`=1.2` or `1.2`)
fn is_pinned(constraint: &VersionConstraint) -> bool {
    match constraint {
        VersionConstraint::Any => false,
        VersionConstraint::List(items) => items.iter().all(|item| match item {
            VersionItem::Exact(_) => true,
            VersionItem::Range(r) => r.lo.is_some() && r.lo == r.hi,
        }),
    }
}

fn invalid(package: &str, message: String) -> Error {
    ResolveError::InvalidRecipe {
        package: package.to_string(),
        message,
    }
    .into()
}
