//! Lazy candidate enumeration for one choice point
//!
//! A package slot's candidates form an odometer over
//! `[version, variant.., compiler, arch]` with the rightmost digit turning
//! fastest. Each digit lists its options most preferred first, so the
//! enumeration order is exactly the tie-break order: newest version, then
//! variant defaults, then the preferred toolchain.

use crate::state::{Decided, Slot, State};
use sprig_index::{PackageIndex, PackageRecipeDescriptor};
use sprig_platform::PlatformFacts;
use sprig_spec::{format_variant, Spec};
use sprig_types::{ArchSpec, CompilerSpec, VariantValue, Version, VersionConstraint};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub(crate) struct NodeCandidates {
    name: String,
    versions: Vec<Version>,
    variants: Vec<(String, Vec<VariantValue>)>,
    compilers: Vec<CompilerSpec>,
    arches: Vec<ArchSpec>,
    cursor: Vec<usize>,
    done: bool,
}

impl NodeCandidates {
    /// Options for every digit; `Err` names the first empty one
    pub fn new(
        desc: &PackageRecipeDescriptor,
        facts: &PlatformFacts,
        slot: &Slot,
    ) -> Result<Self, String> {
        let constraint = &slot.constraint;

        let versions: Vec<Version> = desc
            .version_candidates(&constraint.versions)
            .into_iter()
            .map(|d| d.version.clone())
            .collect();
        if versions.is_empty() {
            return Err(format!(
                "no declared version satisfies @{}",
                constraint.versions
            ));
        }

        if let Some(unknown) = constraint
            .variants
            .keys()
            .find(|k| !desc.variants.contains_key(*k))
        {
            return Err(format!("unknown variant {unknown}"));
        }
        let mut variants = Vec::with_capacity(desc.variants.len());
        for (key, decl) in &desc.variants {
            let options = match constraint.variants.get(key) {
                Some(value) => {
                    let normalized = decl.normalize(value.clone());
                    if !decl.allows(&normalized) {
                        return Err(format!(
                            "{} is not a legal value",
                            format_variant(key, value)
                        ));
                    }
                    vec![normalized]
                }
                None => decl.candidates(),
            };
            variants.push((key.clone(), options));
        }

        let compilers = compiler_options(
            facts,
            constraint.compiler.as_ref(),
            slot.compiler_hint.as_ref(),
        )?;
        let arches = arch_options(facts, &constraint.arch, slot.arch_hint.as_ref())?;

        let digits = variants.len() + 3;
        Ok(Self {
            name: desc.name.clone(),
            versions,
            variants,
            compilers,
            arches,
            cursor: vec![0; digits],
            done: false,
        })
    }

    fn radix(&self, digit: usize) -> usize {
        let n = self.variants.len();
        match digit {
            0 => self.versions.len(),
            d if d <= n => self.variants[d - 1].1.len(),
            d if d == n + 1 => self.compilers.len(),
            _ => self.arches.len(),
        }
    }

    // every digit has at least one option, checked in `new`
    fn current(&self) -> Decided {
        let n = self.variants.len();
        let version = self.versions[self.cursor[0]].clone();
        let variants: BTreeMap<String, VariantValue> = self
            .variants
            .iter()
            .enumerate()
            .map(|(i, (key, options))| (key.clone(), options[self.cursor[i + 1]].clone()))
            .collect();
        let compiler = self.compilers[self.cursor[n + 1]].clone();
        let arch = self.arches[self.cursor[n + 2]].clone();
        Decided {
            spec: Spec {
                name: self.name.clone(),
                versions: VersionConstraint::exact(version.clone()),
                variants,
                compiler: Some(compiler),
                arch,
                dependencies: Vec::new(),
            },
            version,
        }
    }

    fn advance(&mut self) {
        for digit in (0..self.cursor.len()).rev() {
            self.cursor[digit] += 1;
            if self.cursor[digit] < self.radix(digit) {
                return;
            }
            self.cursor[digit] = 0;
        }
        self.done = true;
    }
}

impl Iterator for NodeCandidates {
    type Item = Decided;

    fn next(&mut self) -> Option<Decided> {
        if self.done {
            return None;
        }
        let candidate = self.current();
        self.advance();
        Some(candidate)
    }
}

fn push_unique<T: PartialEq>(out: &mut Vec<T>, item: T) {
    if !out.contains(&item) {
        out.push(item);
    }
}

/// The dependent's compiler first, then the platform's in preference order
fn compiler_options(
    facts: &PlatformFacts,
    want: Option<&CompilerSpec>,
    hint: Option<&CompilerSpec>,
) -> Result<Vec<CompilerSpec>, String> {
    let mut pool = Vec::new();
    for compiler in hint.into_iter().chain(&facts.compilers) {
        if compiler.is_concrete() {
            push_unique(&mut pool, compiler.clone());
        }
    }
    match want {
        None if pool.is_empty() => Err("no compiler available".to_string()),
        None => Ok(pool),
        Some(want) => {
            let matching: Vec<CompilerSpec> =
                pool.into_iter().filter(|c| c.satisfies(want)).collect();
            if !matching.is_empty() {
                Ok(matching)
            } else if want.is_concrete() {
                Ok(vec![want.clone()])
            } else {
                Err(format!("no available compiler satisfies %{want}"))
            }
        }
    }
}

/// The dependent's architecture first, then the host's
fn arch_options(
    facts: &PlatformFacts,
    want: &ArchSpec,
    hint: Option<&ArchSpec>,
) -> Result<Vec<ArchSpec>, String> {
    let mut out = Vec::new();
    if let Some(hint) = hint.filter(|h| h.is_concrete() && h.satisfies(want)) {
        push_unique(&mut out, hint.clone());
    }
    match want.merge(&facts.arch) {
        Some(merged) if merged.is_concrete() => push_unique(&mut out, merged),
        _ if want.is_concrete() => push_unique(&mut out, want.clone()),
        _ => {}
    }
    if out.is_empty() {
        Err(format!("arch={want} is not available on this host"))
    } else {
        Ok(out)
    }
}

/// Providers for `virtual_name` in preference order
///
/// Providers already present in the graph (or constrained with `^`) come
/// first, then the configured preference, then name order.
pub(crate) fn provider_order(
    index: &PackageIndex,
    state: &State,
    preferences: &BTreeMap<String, Vec<String>>,
    virtual_name: &str,
) -> Vec<String> {
    let preferred = preferences.get(virtual_name).map_or(&[][..], Vec::as_slice);
    let mut providers: Vec<String> = index.providers(virtual_name).to_vec();
    providers.sort_by_key(|p| {
        (
            !state.slots.contains_key(p),
            preferred
                .iter()
                .position(|x| x == p)
                .unwrap_or(preferred.len()),
            p.clone(),
        )
    });
    providers
}

/// Remaining options at one choice point
#[derive(Debug, Clone)]
pub(crate) enum Choices {
    Node(NodeCandidates),
    Providers(std::vec::IntoIter<String>),
}

#[derive(Debug, Clone)]
pub(crate) enum Choice {
    Node(Decided),
    Provider(String),
}

impl Iterator for Choices {
    type Item = Choice;

    fn next(&mut self) -> Option<Choice> {
        match self {
            Self::Node(nodes) => nodes.next().map(Choice::Node),
            Self::Providers(providers) => providers.next().map(Choice::Provider),
        }
    }
}
