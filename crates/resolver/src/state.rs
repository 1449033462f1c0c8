//! Search state, cloned at every choice point

use crate::candidates::NodeCandidates;
use sprig_errors::{ConflictRecord, ResolveError, SpecError};
use sprig_index::PackageIndex;
use sprig_platform::PlatformFacts;
use sprig_spec::Spec;
use sprig_types::{ArchSpec, CompilerSpec, DepTypes, Version, VersionConstraint};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Origin label for constraints written by the caller
pub(crate) const REQUEST: &str = "request";

/// Edge classes that must each stay acyclic
///
/// Build and link share a class since both order builds.
pub(crate) const CYCLE_CLASSES: [DepTypes; 3] =
    [DepTypes::BUILD_LINK, DepTypes::RUN, DepTypes::TEST];

/// A choice variable: one package slot or one virtual slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Item {
    Package(String),
    Virtual(String),
}

/// A fully pinned assignment for one package slot
#[derive(Debug, Clone)]
pub(crate) struct Decided {
    pub version: Version,
    /// Node-only concrete spec
    pub spec: Spec,
}

/// Why a candidate assignment was rejected
#[derive(Debug, Clone)]
pub(crate) enum Problem {
    Conflict(ConflictRecord),
    /// Package names along a same-class cycle, first repeated at the end
    Cycle(Vec<String>),
    /// Ends the search; no other choice can repair it
    Fatal(ResolveError),
}

#[derive(Debug, Clone)]
pub(crate) struct Slot {
    /// Merged constraint from every dependent, node-only
    pub constraint: Spec,
    pub origins: BTreeSet<String>,
    /// Reached through an edge or named as a root
    pub active: bool,
    pub decided: Option<Decided>,
    /// Toolchain of the first dependent, preferred when still allowed
    pub compiler_hint: Option<CompilerSpec>,
    pub arch_hint: Option<ArchSpec>,
    /// Typed `^[...]` edges requested on the command line
    pub direct: Vec<(String, DepTypes)>,
}

impl Slot {
    fn new(name: &str) -> Self {
        Self {
            constraint: Spec::named(name),
            origins: BTreeSet::new(),
            active: false,
            decided: None,
            compiler_hint: None,
            arch_hint: None,
            direct: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct VirtualSlot {
    pub constraint: Spec,
    pub origins: BTreeSet<String>,
    pub active: bool,
    pub provider: Option<String>,
    pub compiler_hint: Option<CompilerSpec>,
    pub arch_hint: Option<ArchSpec>,
}

impl VirtualSlot {
    fn new(name: &str) -> Self {
        Self {
            constraint: Spec::named(name),
            origins: BTreeSet::new(),
            active: false,
            provider: None,
            compiler_hint: None,
            arch_hint: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    pub slots: BTreeMap<String, Slot>,
    pub virtuals: BTreeMap<String, VirtualSlot>,
    /// Decided package -> target key (package or virtual name) -> types
    pub edges: BTreeMap<String, BTreeMap<String, DepTypes>>,
    pub agenda: VecDeque<Item>,
    /// Root keys in name order
    pub roots: Vec<String>,
    /// Names constrained with `^` that must end up in the graph
    pub required: BTreeSet<String>,
}

pub(crate) fn conflict<'a>(
    package: &str,
    reason: String,
    origins: impl IntoIterator<Item = &'a String>,
) -> ConflictRecord {
    let origins: BTreeSet<&String> = origins.into_iter().collect();
    ConflictRecord {
        package: package.to_string(),
        reason,
        origins: origins.into_iter().cloned().collect(),
    }
}

fn describe(err: &SpecError) -> String {
    match err {
        SpecError::ConflictingConstraints { left, right, .. } => {
            format!("{left} conflicts with {right}")
        }
        other => other.to_string(),
    }
}

/// The parts of a virtual constraint that carry over to its provider
pub(crate) fn forward_to_provider(constraint: &Spec, provider: &str) -> Spec {
    Spec {
        name: provider.to_string(),
        versions: VersionConstraint::Any,
        variants: constraint.variants.clone(),
        compiler: constraint.compiler.clone(),
        arch: constraint.arch.clone(),
        dependencies: Vec::new(),
    }
}

impl State {
    /// Merge `constraint` into the slot for `name`
    ///
    /// A decided slot must already satisfy the merged constraint; an
    /// undecided one must still have at least one candidate.
    pub fn constrain(
        &mut self,
        index: &PackageIndex,
        facts: &PlatformFacts,
        name: &str,
        constraint: &Spec,
        origins: &[String],
    ) -> Result<(), ConflictRecord> {
        if index.is_virtual(name) {
            return self.constrain_virtual(index, facts, name, constraint, origins);
        }

        let incoming = Spec {
            name: name.to_string(),
            ..constraint.node_only()
        };
        let slot = self
            .slots
            .entry(name.to_string())
            .or_insert_with(|| Slot::new(name));
        let merged = slot
            .constraint
            .merge_constraints(&incoming)
            .map_err(|e| conflict(name, describe(&e), slot.origins.iter().chain(origins)))?;
        slot.origins.extend(origins.iter().cloned());
        slot.constraint = merged;

        if let Some(decided) = &slot.decided {
            if !decided.spec.satisfies(&slot.constraint) {
                return Err(conflict(
                    name,
                    format!("{} does not satisfy {incoming}", decided.spec),
                    &slot.origins,
                ));
            }
            return Ok(());
        }

        let desc = index
            .lookup(name)
            .map_err(|e| conflict(name, e.to_string(), &slot.origins))?;
        NodeCandidates::new(desc, facts, slot)
            .map(|_| ())
            .map_err(|reason| conflict(name, reason, &slot.origins))
    }

    fn constrain_virtual(
        &mut self,
        index: &PackageIndex,
        facts: &PlatformFacts,
        name: &str,
        constraint: &Spec,
        origins: &[String],
    ) -> Result<(), ConflictRecord> {
        let incoming = Spec {
            name: name.to_string(),
            ..constraint.node_only()
        };
        let vslot = self
            .virtuals
            .entry(name.to_string())
            .or_insert_with(|| VirtualSlot::new(name));
        let merged = vslot
            .constraint
            .merge_constraints(&incoming)
            .map_err(|e| conflict(name, describe(&e), vslot.origins.iter().chain(origins)))?;
        vslot.origins.extend(origins.iter().cloned());
        vslot.constraint = merged;

        match vslot.provider.clone() {
            Some(provider) => self.constrain(
                index,
                facts,
                &provider,
                &forward_to_provider(&incoming, &provider),
                origins,
            ),
            None => Ok(()),
        }
    }

    /// Mark `name` reachable and queue it for a decision
    pub fn activate(&mut self, index: &PackageIndex, name: &str) {
        if index.is_virtual(name) {
            let vslot = self
                .virtuals
                .entry(name.to_string())
                .or_insert_with(|| VirtualSlot::new(name));
            if !vslot.active {
                vslot.active = true;
                self.agenda.push_back(Item::Virtual(name.to_string()));
            }
        } else {
            let slot = self
                .slots
                .entry(name.to_string())
                .or_insert_with(|| Slot::new(name));
            if !slot.active {
                slot.active = true;
                self.agenda.push_back(Item::Package(name.to_string()));
            }
        }
    }

    /// Record the dependent's toolchain unless an earlier one was recorded
    pub fn hint(&mut self, name: &str, compiler: Option<&CompilerSpec>, arch: Option<&ArchSpec>) {
        let (compiler_hint, arch_hint) = if let Some(slot) = self.slots.get_mut(name) {
            (&mut slot.compiler_hint, &mut slot.arch_hint)
        } else if let Some(vslot) = self.virtuals.get_mut(name) {
            (&mut vslot.compiler_hint, &mut vslot.arch_hint)
        } else {
            return;
        };
        if compiler_hint.is_none() {
            *compiler_hint = compiler.cloned();
        }
        if arch_hint.is_none() {
            *arch_hint = arch.cloned();
        }
    }

    /// Next queued item without a decision
    pub fn next_item(&mut self) -> Option<Item> {
        while let Some(item) = self.agenda.pop_front() {
            let decided = match &item {
                Item::Package(name) => self
                    .slots
                    .get(name)
                    .is_some_and(|s| s.decided.is_some()),
                Item::Virtual(name) => self
                    .virtuals
                    .get(name)
                    .is_some_and(|v| v.provider.is_some()),
            };
            if !decided {
                return Some(item);
            }
        }
        None
    }

    /// Package a key stands for: itself, or a virtual's chosen provider
    pub fn resolve<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        if self.slots.contains_key(key) {
            Some(key)
        } else {
            self.virtuals.get(key).and_then(|v| v.provider.as_deref())
        }
    }

    /// Add or widen `from -> to_key`, rejecting same-class cycles
    pub fn add_edge(&mut self, from: &str, to_key: &str, types: DepTypes) -> Result<(), Vec<String>> {
        *self
            .edges
            .entry(from.to_string())
            .or_default()
            .entry(to_key.to_string())
            .or_insert(DepTypes::empty()) |= types;

        let Some(to) = self.resolve(to_key) else {
            return Ok(());
        };
        match self.closing_cycle(from, to, types) {
            Some(cycle) => Err(cycle),
            None => Ok(()),
        }
    }

    /// Cycle that a `from -> to` edge of `types` would close, if any
    pub fn closing_cycle(&self, from: &str, to: &str, types: DepTypes) -> Option<Vec<String>> {
        CYCLE_CLASSES
            .iter()
            .filter(|class| types.intersects(**class))
            .find_map(|class| self.typed_path(to, from, *class))
            .map(|path| {
                let mut cycle = vec![from.to_string()];
                cycle.extend(path);
                cycle
            })
    }

    /// Decided dependents holding an edge to `key`
    pub fn edges_into(&self, key: &str) -> Vec<(String, DepTypes)> {
        self.edges
            .iter()
            .filter_map(|(from, targets)| targets.get(key).map(|t| (from.clone(), *t)))
            .collect()
    }

    /// Path `start .. goal` over edges in `class`, both ends included
    pub fn typed_path(&self, start: &str, goal: &str, class: DepTypes) -> Option<Vec<String>> {
        let mut visited = BTreeSet::new();
        let mut path = Vec::new();
        self.search_path(start, goal, class, &mut visited, &mut path)
            .then_some(path)
    }

    fn search_path(
        &self,
        at: &str,
        goal: &str,
        class: DepTypes,
        visited: &mut BTreeSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        path.push(at.to_string());
        if at == goal {
            return true;
        }
        if visited.insert(at.to_string()) {
            if let Some(targets) = self.edges.get(at) {
                for (key, types) in targets {
                    if !types.intersects(class) {
                        continue;
                    }
                    let Some(next) = self.resolve(key) else {
                        continue;
                    };
                    if self.search_path(next, goal, class, visited, path) {
                        return true;
                    }
                }
            }
        }
        path.pop();
        false
    }
}
