//! Backtracking concretizer

use crate::candidates::{provider_order, Choice, Choices, NodeCandidates};
use crate::state::{
    conflict, forward_to_provider, Decided, Item, Problem, State, CYCLE_CLASSES, REQUEST,
};
use sprig_errors::{ConflictRecord, Error, ResolveError, SpecError};
use sprig_events::{
    AppEvent, EventEmitter, EventSender, FailureContext, ResolverEvent,
};
use sprig_index::PackageIndex;
use sprig_platform::PlatformFacts;
use sprig_spec::{ConcreteDag, DagBuilder, NodeDraft, NodeId, Spec};
use sprig_types::DepTypes;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::debug;

const NO_ORIGINS: &[String] = &[];

/// Search limits and preferences
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Candidate assignments tried before giving up
    pub max_steps: usize,
    /// Preferred providers per virtual, most preferred first
    pub providers: BTreeMap<String, Vec<String>>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            providers: BTreeMap::new(),
        }
    }
}

/// One open decision with the state it was taken from
struct ChoicePoint {
    base: State,
    item: Item,
    choices: Choices,
}

/// Turns abstract specs into a concrete DAG against one index
///
/// Concretization is a pure function of the index, the platform facts,
/// the options and the requests; equal inputs give identical DAGs.
pub struct Resolver<'a> {
    index: &'a PackageIndex,
    facts: &'a PlatformFacts,
    options: ResolverOptions,
    event_sender: Option<EventSender>,
}

impl EventEmitter for Resolver<'_> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(index: &'a PackageIndex, facts: &'a PlatformFacts) -> Self {
        Self {
            index,
            facts,
            options: ResolverOptions::default(),
            event_sender: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Concretize `requests` into one DAG
    ///
    /// Every root shares the same slots, so a package appears once no
    /// matter how many requests reach it.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::UnknownPackage`] for a requested name or a
    ///   dependency absent from the index
    /// - [`ResolveError::UnsatisfiableConstraints`] with every conflict met
    ///   on the way when no assignment exists
    /// - [`ResolveError::CyclicDependency`] when every failure is a cycle
    ///   among edges of one class (build/link, run or test)
    /// - [`ResolveError::SearchLimitExceeded`] after `max_steps` attempts
    /// - [`SpecError::Parse`] for an anonymous or empty request
    pub fn concretize(&self, requests: &[Spec]) -> Result<ConcreteDag, Error> {
        let started = Instant::now();
        self.emit(AppEvent::Resolver(ResolverEvent::Started {
            roots: requests.iter().map(ToString::to_string).collect(),
        }));

        match self.search(requests) {
            Ok((dag, steps)) => {
                self.emit(AppEvent::Resolver(ResolverEvent::Completed {
                    nodes: dag.len(),
                    steps: u64::try_from(steps).unwrap_or(u64::MAX),
                    duration_ms: u64::try_from(started.elapsed().as_millis())
                        .unwrap_or(u64::MAX),
                }));
                Ok(dag)
            }
            Err(err) => {
                self.emit(AppEvent::Resolver(ResolverEvent::Failed {
                    failure: FailureContext::from_error(&err),
                }));
                Err(err)
            }
        }
    }

    fn search(&self, requests: &[Spec]) -> Result<(ConcreteDag, usize), Error> {
        if requests.is_empty() {
            return Err(SpecError::Parse {
                input: String::new(),
                message: "nothing to concretize".to_string(),
            }
            .into());
        }
        self.check_static_cycles(requests)?;
        let mut state = self.initial_state(requests)?;

        let mut stack: Vec<ChoicePoint> = Vec::new();
        let mut failures: Vec<Problem> = Vec::new();
        let mut steps = 0usize;

        loop {
            let opened = match state.next_item() {
                None => match self.final_check(&state) {
                    Ok(()) => return Ok((self.finalize(&state)?, steps)),
                    Err(problem) => Err(problem),
                },
                Some(item) => self.choices_for(&state, &item).map(|choices| (item, choices)),
            };
            match opened {
                Ok((item, choices)) => stack.push(ChoicePoint {
                    base: state,
                    item,
                    choices,
                }),
                Err(problem) => failures.push(problem),
            }

            state = match self.advance(&mut stack, &mut failures, &mut steps)? {
                Some(next) => next,
                None => return Err(exhausted(failures).into()),
            };
        }
    }

    /// Apply the next untried choice, stepping back through exhausted points
    fn advance(
        &self,
        stack: &mut Vec<ChoicePoint>,
        failures: &mut Vec<Problem>,
        steps: &mut usize,
    ) -> Result<Option<State>, ResolveError> {
        while let Some(point) = stack.last_mut() {
            let Some(choice) = point.choices.next() else {
                let depth = stack.len();
                if let Some(point) = stack.pop() {
                    let name = match point.item {
                        Item::Package(name) | Item::Virtual(name) => name,
                    };
                    let reason = failures
                        .last()
                        .map_or_else(|| "no candidates".to_string(), describe_problem);
                    debug!(package = %name, depth, "backtracking");
                    self.emit(AppEvent::Resolver(ResolverEvent::Backtracked {
                        package: name,
                        depth,
                        reason,
                    }));
                }
                continue;
            };

            *steps += 1;
            if *steps > self.options.max_steps {
                return Err(ResolveError::SearchLimitExceeded {
                    limit: self.options.max_steps,
                });
            }

            let mut next = point.base.clone();
            let applied = match (&point.item, choice) {
                (Item::Package(name), Choice::Node(decided)) => {
                    self.decide_package(&mut next, name, decided)
                }
                (Item::Virtual(name), Choice::Provider(provider)) => {
                    self.decide_virtual(&mut next, name, &provider)
                }
                (item, _) => Err(Problem::Conflict(ConflictRecord {
                    package: format!("{item:?}"),
                    reason: "choice does not match its slot".to_string(),
                    origins: Vec::new(),
                })),
            };
            match applied {
                Ok(()) => return Ok(Some(next)),
                Err(Problem::Fatal(err)) => return Err(err),
                Err(problem) => failures.push(problem),
            }
        }
        Ok(None)
    }

    fn choices_for(&self, state: &State, item: &Item) -> Result<Choices, Problem> {
        match item {
            Item::Package(name) => {
                let slot = state.slots.get(name).ok_or_else(|| {
                    Problem::Conflict(conflict(name, "slot missing".to_string(), NO_ORIGINS))
                })?;
                let desc = self
                    .index
                    .lookup(name)
                    .map_err(|e| Problem::Conflict(conflict(name, e.to_string(), &slot.origins)))?;
                NodeCandidates::new(desc, self.facts, slot)
                    .map(Choices::Node)
                    .map_err(|reason| Problem::Conflict(conflict(name, reason, &slot.origins)))
            }
            Item::Virtual(name) => {
                let providers =
                    provider_order(self.index, state, &self.options.providers, name);
                if providers.is_empty() {
                    let origins = state
                        .virtuals
                        .get(name)
                        .map(|v| v.origins.iter().cloned().collect::<Vec<_>>())
                        .unwrap_or_default();
                    return Err(Problem::Conflict(conflict(
                        name,
                        "no package provides it".to_string(),
                        &origins,
                    )));
                }
                Ok(Choices::Providers(providers.into_iter()))
            }
        }
    }

    fn decide_package(&self, state: &mut State, name: &str, decided: Decided) -> Result<(), Problem> {
        let desc = self
            .index
            .lookup(name)
            .map_err(|e| Problem::Conflict(conflict(name, e.to_string(), NO_ORIGINS)))?;
        let slot = state.slots.get_mut(name).ok_or_else(|| {
            Problem::Conflict(conflict(name, "slot missing".to_string(), NO_ORIGINS))
        })?;

        if let Some(rule) = self.index.active_conflicts(desc, &decided.spec).first() {
            return Err(Problem::Conflict(conflict(
                name,
                format!("{} conflicts with {}: {}", decided.spec, rule.when, rule.message),
                &slot.origins,
            )));
        }

        let spec = decided.spec.clone();
        let direct = slot.direct.clone();
        slot.decided = Some(decided);

        for (virtual_name, vslot) in &state.virtuals {
            if vslot.provider.as_deref() == Some(name) && !self.index.provides(&spec, virtual_name) {
                return Err(Problem::Conflict(conflict(
                    name,
                    format!("{spec} does not provide {virtual_name}"),
                    &vslot.origins,
                )));
            }
        }

        let mut deps = self
            .index
            .applicable_dependencies(desc, &spec)
            .map_err(|e| recipe_problem(name, e))?;
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(dep) = deps.iter().find(|d| self.known(&d.name).is_err()) {
            debug!(package = %name, dependency = %dep.name, "dependency is not in the index");
            return Err(Problem::Fatal(ResolveError::UnknownPackage {
                name: dep.name.clone(),
            }));
        }

        let from = [name.to_string()];
        for dep in &deps {
            state
                .constrain(self.index, self.facts, &dep.name, &dep.constraint, &from)
                .map_err(Problem::Conflict)?;
            state.hint(&dep.name, spec.compiler.as_ref(), Some(&spec.arch));
            state.activate(self.index, &dep.name);
            state.add_edge(name, &dep.name, dep.types).map_err(Problem::Cycle)?;
        }
        for (dep, types) in direct {
            state.hint(&dep, spec.compiler.as_ref(), Some(&spec.arch));
            state.activate(self.index, &dep);
            state.add_edge(name, &dep, types).map_err(Problem::Cycle)?;
        }
        Ok(())
    }

    fn decide_virtual(&self, state: &mut State, name: &str, provider: &str) -> Result<(), Problem> {
        let vslot = state.virtuals.get_mut(name).ok_or_else(|| {
            Problem::Conflict(conflict(name, "slot missing".to_string(), NO_ORIGINS))
        })?;
        vslot.provider = Some(provider.to_string());
        let vslot = vslot.clone();
        let origins: Vec<String> = vslot.origins.iter().cloned().collect();

        state
            .constrain(
                self.index,
                self.facts,
                provider,
                &forward_to_provider(&vslot.constraint, provider),
                &origins,
            )
            .map_err(Problem::Conflict)?;

        if let Some(decided) = state.slots.get(provider).and_then(|s| s.decided.as_ref()) {
            if !self.index.provides(&decided.spec, name) {
                return Err(Problem::Conflict(conflict(
                    provider,
                    format!("{} does not provide {name}", decided.spec),
                    &origins,
                )));
            }
        }

        state.hint(provider, vslot.compiler_hint.as_ref(), vslot.arch_hint.as_ref());
        state.activate(self.index, provider);

        for (from, types) in state.edges_into(name) {
            if let Some(cycle) = state.closing_cycle(&from, provider, types) {
                return Err(Problem::Cycle(cycle));
            }
        }
        Ok(())
    }

    /// Reject cycles that no choice can avoid
    fn check_static_cycles(&self, requests: &[Spec]) -> Result<(), ResolveError> {
        let mut reachable = BTreeSet::new();
        let mut pending: Vec<&str> = requests
            .iter()
            .map(|r| r.name.as_str())
            .filter(|n| self.index.contains(n))
            .collect();
        while let Some(name) = pending.pop() {
            if reachable.insert(name) {
                pending.extend(self.index.unconditional_dependencies(name, DepTypes::all()));
            }
        }

        for class in CYCLE_CLASSES {
            let mut done = BTreeSet::new();
            for name in &reachable {
                let mut path = Vec::new();
                if let Some(cycle) = self.static_cycle(name, class, &mut path, &mut done) {
                    return Err(ResolveError::CyclicDependency { cycle });
                }
            }
        }
        Ok(())
    }

    /// Cycle among unconditional edges of `class` reachable from `name`
    fn static_cycle(
        &self,
        name: &str,
        class: DepTypes,
        path: &mut Vec<String>,
        done: &mut BTreeSet<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = path.iter().position(|p| p == name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(name.to_string());
            return Some(cycle);
        }
        if done.contains(name) {
            return None;
        }
        path.push(name.to_string());
        for dep in self.index.unconditional_dependencies(name, class) {
            if let Some(cycle) = self.static_cycle(dep, class, path, done) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(name.to_string());
        None
    }

    /// Seed slots and the agenda from requests taken in name order
    fn initial_state(&self, requests: &[Spec]) -> Result<State, Error> {
        let mut state = State::default();
        let origin = [REQUEST.to_string()];
        let unsatisfiable = |record: ConflictRecord| ResolveError::UnsatisfiableConstraints {
            conflicts: vec![record],
        };

        let mut ordered: Vec<&Spec> = requests.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        for request in ordered {
            if request.is_anonymous() {
                return Err(SpecError::Parse {
                    input: request.to_string(),
                    message: "a root spec needs a package name".to_string(),
                }
                .into());
            }
            self.known(&request.name)?;
            state
                .constrain(self.index, self.facts, &request.name, request, &origin)
                .map_err(unsatisfiable)?;
            state.activate(self.index, &request.name);
            if !state.roots.contains(&request.name) {
                state.roots.push(request.name.clone());
            }

            let root_is_package = !self.index.is_virtual(&request.name);
            for dep in &request.dependencies {
                self.known(&dep.spec.name)?;
                state
                    .constrain(self.index, self.facts, &dep.spec.name, &dep.spec, &origin)
                    .map_err(unsatisfiable)?;
                if dep.types.is_empty() || !root_is_package {
                    state.required.insert(dep.spec.name.clone());
                } else if let Some(slot) = state.slots.get_mut(&request.name) {
                    slot.direct.push((dep.spec.name.clone(), dep.types));
                }
            }
        }
        for slot in state.slots.values_mut() {
            slot.direct.sort();
        }
        Ok(state)
    }

    fn known(&self, name: &str) -> Result<(), ResolveError> {
        if self.index.contains(name) || self.index.is_virtual(name) {
            Ok(())
        } else {
            Err(ResolveError::UnknownPackage {
                name: name.to_string(),
            })
        }
    }

    /// Every `^name` constraint must have landed in the graph
    fn final_check(&self, state: &State) -> Result<(), Problem> {
        for name in &state.required {
            let active = state.slots.get(name).is_some_and(|s| s.active)
                || state.virtuals.get(name).is_some_and(|v| v.active);
            if !active {
                return Err(Problem::Conflict(conflict(
                    name,
                    "is not a dependency of any requested package".to_string(),
                    &[REQUEST.to_string()],
                )));
            }
        }
        Ok(())
    }

    fn finalize(&self, state: &State) -> Result<ConcreteDag, Error> {
        let mut builder = DagBuilder::new();
        let mut ids: BTreeMap<&str, NodeId> = BTreeMap::new();

        for (name, slot) in &state.slots {
            if !slot.active {
                continue;
            }
            let decided = slot
                .decided
                .as_ref()
                .ok_or_else(|| Error::internal(format!("{name} was never decided")))?;
            let desc = self.index.lookup(name)?;
            let compiler = decided
                .spec
                .compiler
                .clone()
                .ok_or_else(|| Error::internal(format!("{name} has no compiler")))?;
            let id = builder.add_node(NodeDraft {
                name: name.clone(),
                version: decided.version.clone(),
                variants: decided.spec.variants.clone(),
                compiler,
                arch: decided.spec.arch.clone(),
                build_system: desc.build_system,
            });
            ids.insert(name.as_str(), id);
        }

        let node_id = |key: &str| {
            state
                .resolve(key)
                .and_then(|name| ids.get(name).copied())
                .ok_or_else(|| Error::internal(format!("{key} did not resolve to a node")))
        };

        for (from, targets) in &state.edges {
            let Some(&from_id) = ids.get(from.as_str()) else {
                continue;
            };
            for (key, types) in targets {
                builder.add_edge(from_id, node_id(key)?, *types);
            }
        }

        let mut roots = Vec::with_capacity(state.roots.len());
        for key in &state.roots {
            let id = node_id(key)?;
            if !roots.contains(&id) {
                roots.push(id);
            }
        }
        Ok(builder.finish(&roots)?)
    }
}

fn describe_problem(problem: &Problem) -> String {
    match problem {
        Problem::Conflict(record) => record.to_string(),
        Problem::Cycle(cycle) => format!("dependency cycle {}", cycle.join(" -> ")),
        Problem::Fatal(err) => err.to_string(),
    }
}

fn recipe_problem(package: &str, err: ResolveError) -> Problem {
    match err {
        ResolveError::UnsatisfiableConstraints { conflicts } if !conflicts.is_empty() => {
            Problem::Conflict(conflicts[0].clone())
        }
        other => Problem::Conflict(conflict(package, other.to_string(), NO_ORIGINS)),
    }
}

/// Final error once every branch has failed
///
/// Conflicts are deduplicated by package and reason with their origins
/// merged, in the order they were first met.
fn exhausted(failures: Vec<Problem>) -> ResolveError {
    if failures.iter().all(|p| matches!(p, Problem::Cycle(_))) {
        if let Some(Problem::Cycle(cycle)) = failures.into_iter().next() {
            return ResolveError::CyclicDependency { cycle };
        }
        return ResolveError::UnsatisfiableConstraints {
            conflicts: Vec::new(),
        };
    }

    let mut conflicts: Vec<ConflictRecord> = Vec::new();
    for problem in failures {
        let record = match problem {
            Problem::Conflict(record) => record,
            Problem::Cycle(cycle) => ConflictRecord {
                package: cycle.first().cloned().unwrap_or_default(),
                reason: format!("dependency cycle {}", cycle.join(" -> ")),
                origins: Vec::new(),
            },
            Problem::Fatal(err) => return err,
        };
        match conflicts
            .iter_mut()
            .find(|c| c.package == record.package && c.reason == record.reason)
        {
            Some(existing) => {
                let merged: BTreeSet<String> =
                    existing.origins.drain(..).chain(record.origins).collect();
                existing.origins = merged.into_iter().collect();
            }
            None => conflicts.push(record),
        }
    }
    ResolveError::UnsatisfiableConstraints { conflicts }
}
