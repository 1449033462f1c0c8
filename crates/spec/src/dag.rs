//! Concrete dependency graphs
//!
//! Nodes live in an arena and edges refer to node ids, so cross-type cycles
//! between nodes need no shared ownership. Hashes are assigned bottom-up
//! over build and link edges when the graph is finished.

use serde::{Deserialize, Serialize};
use sprig_errors::SpecError;
use sprig_hash::Hash;
use sprig_types::{
    ArchSpec, BuildSystemKind, CompilerSpec, DepTypes, VariantValue, Version, VersionConstraint,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use crate::hash::{canonical_hash, CanonicalDep, CanonicalNode};
use crate::spec::{DependencySpec, Spec};

/// Index of a node inside its [`ConcreteDag`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteEdge {
    pub target: NodeId,
    pub types: DepTypes,
}

/// One fully resolved package instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteNode {
    pub name: String,
    pub version: Version,
    pub variants: BTreeMap<String, VariantValue>,
    pub compiler: CompilerSpec,
    pub arch: ArchSpec,
    pub build_system: BuildSystemKind,
    /// Sorted by dependency name
    pub dependencies: Vec<ConcreteEdge>,
    pub hash: Hash,
}

/// Node contents before hashing
#[derive(Debug, Clone)]
pub struct NodeDraft {
    pub name: String,
    pub version: Version,
    pub variants: BTreeMap<String, VariantValue>,
    pub compiler: CompilerSpec,
    pub arch: ArchSpec,
    pub build_system: BuildSystemKind,
}

/// Accumulates nodes and edges, then hashes them into a [`ConcreteDag`]
#[derive(Debug, Default)]
pub struct DagBuilder {
    drafts: Vec<NodeDraft>,
    edges: Vec<Vec<ConcreteEdge>>,
}

impl DagBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, draft: NodeDraft) -> NodeId {
        self.drafts.push(draft);
        self.edges.push(Vec::new());
        NodeId(self.drafts.len() - 1)
    }

    /// Add or widen the edge `from -> to`
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, types: DepTypes) {
        let edges = &mut self.edges[from.0];
        if let Some(edge) = edges.iter_mut().find(|e| e.target == to) {
            edge.types |= types;
        } else {
            edges.push(ConcreteEdge { target: to, types });
        }
    }

    /// Validate, hash bottom-up and freeze the graph
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::MalformedGraph`] if a version, compiler or
    /// architecture is not pinned, if two nodes share a name, or if the
    /// build/link, run or test edges alone contain a cycle.
    pub fn finish(self, roots: &[NodeId]) -> Result<ConcreteDag, SpecError> {
        let malformed = |message: String| SpecError::MalformedGraph { message };
        let Self { drafts, mut edges } = self;

        let mut seen = HashMap::new();
        for (idx, draft) in drafts.iter().enumerate() {
            if !draft.compiler.is_concrete() || !draft.arch.is_concrete() {
                return Err(malformed(format!("{} is not fully pinned", draft.name)));
            }
            if let Some(prev) = seen.insert(draft.name.as_str(), idx) {
                return Err(malformed(format!(
                    "{} appears twice (nodes {prev} and {idx})",
                    draft.name
                )));
            }
        }
        for edge_list in &mut edges {
            edge_list.sort_by(|a, b| drafts[a.target.0].name.cmp(&drafts[b.target.0].name));
        }

        let order = class_order(&drafts, &edges, DepTypes::BUILD_LINK).map_err(malformed)?;
        for class in [DepTypes::RUN, DepTypes::TEST] {
            class_order(&drafts, &edges, class).map_err(malformed)?;
        }
        let mut hashes: Vec<Option<Hash>> = vec![None; drafts.len()];
        for idx in order {
            let draft = &drafts[idx];
            let mut deps = Vec::new();
            for edge in &edges[idx] {
                if edge.types.is_build_or_link() {
                    let hash = hashes[edge.target.0].clone().ok_or_else(|| {
                        malformed(format!("{} hashed before its dependencies", draft.name))
                    })?;
                    deps.push(CanonicalDep {
                        name: drafts[edge.target.0].name.clone(),
                        hash,
                        types: edge.types & DepTypes::BUILD_LINK,
                    });
                }
            }
            hashes[idx] = Some(canonical_hash(&CanonicalNode {
                name: &draft.name,
                version: &draft.version,
                variants: &draft.variants,
                compiler: &draft.compiler,
                arch: &draft.arch,
                dependencies: deps,
            }));
        }

        let mut nodes = Vec::with_capacity(drafts.len());
        let mut by_hash = HashMap::new();
        for (idx, (draft, dependencies)) in drafts.into_iter().zip(edges).enumerate() {
            let hash = hashes[idx]
                .clone()
                .ok_or_else(|| malformed(format!("{} was never hashed", draft.name)))?;
            by_hash.insert(hash.clone(), NodeId(idx));
            nodes.push(ConcreteNode {
                name: draft.name,
                version: draft.version,
                variants: draft.variants,
                compiler: draft.compiler,
                arch: draft.arch,
                build_system: draft.build_system,
                dependencies,
                hash,
            });
        }

        let mut roots = roots.to_vec();
        roots.dedup();
        if let Some(bad) = roots.iter().find(|r| r.0 >= nodes.len()) {
            return Err(malformed(format!("root {} out of range", bad.0)));
        }

        Ok(ConcreteDag {
            nodes,
            roots,
            by_hash,
        })
    }
}

/// Kahn order over edges in `class`, dependencies first
fn class_order(
    drafts: &[NodeDraft],
    edges: &[Vec<ConcreteEdge>],
    class: DepTypes,
) -> Result<Vec<usize>, String> {
    let mut pending: Vec<usize> = edges
        .iter()
        .map(|list| list.iter().filter(|e| e.types.intersects(class)).count())
        .collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); drafts.len()];
    for (idx, list) in edges.iter().enumerate() {
        for edge in list.iter().filter(|e| e.types.intersects(class)) {
            dependents[edge.target.0].push(idx);
        }
    }

    let mut queue: VecDeque<usize> = (0..drafts.len()).filter(|i| pending[*i] == 0).collect();
    let mut order = Vec::with_capacity(drafts.len());
    while let Some(idx) = queue.pop_front() {
        order.push(idx);
        for &parent in &dependents[idx] {
            pending[parent] -= 1;
            if pending[parent] == 0 {
                queue.push_back(parent);
            }
        }
    }

    if order.len() == drafts.len() {
        Ok(order)
    } else {
        let stuck: Vec<&str> = (0..drafts.len())
            .filter(|i| pending[*i] > 0)
            .map(|i| drafts[i].name.as_str())
            .collect();
        Err(format!("{class} cycle among {}", stuck.join(", ")))
    }
}

/// A resolved, hashed, read-only dependency graph
#[derive(Debug, Clone)]
pub struct ConcreteDag {
    nodes: Vec<ConcreteNode>,
    roots: Vec<NodeId>,
    by_hash: HashMap<Hash, NodeId>,
}

impl ConcreteDag {
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &ConcreteNode {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &ConcreteNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    #[must_use]
    pub fn find_hash(&self, hash: &Hash) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    #[must_use]
    pub fn find_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    /// Direct dependencies whose edge types intersect `mask`
    pub fn dependencies(&self, id: NodeId, mask: DepTypes) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .dependencies
            .iter()
            .filter(move |e| e.types.intersects(mask))
            .map(|e| e.target)
    }

    /// Nodes reachable from `start` over edges in `mask`, dependencies
    /// before dependents, `start` last
    #[must_use]
    pub fn traverse(&self, start: NodeId, mask: DepTypes) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut out = Vec::new();
        self.post_order(start, mask, &mut visited, &mut out);
        out
    }

    fn post_order(&self, id: NodeId, mask: DepTypes, visited: &mut [bool], out: &mut Vec<NodeId>) {
        if visited[id.0] {
            return;
        }
        visited[id.0] = true;
        for dep in self.dependencies(id, mask) {
            self.post_order(dep, mask, visited, out);
        }
        out.push(id);
    }

    /// `name@=version%compiler+variants arch=...` for one node
    #[must_use]
    pub fn format_node(&self, id: NodeId) -> String {
        self.node_spec(id).to_string()
    }

    fn node_spec(&self, id: NodeId) -> Spec {
        let node = &self.nodes[id.0];
        Spec {
            name: node.name.clone(),
            versions: VersionConstraint::exact(node.version.clone()),
            variants: node.variants.clone(),
            compiler: Some(node.compiler.clone()),
            arch: node.arch.clone(),
            dependencies: Vec::new(),
        }
    }

    /// Concrete [`Spec`] tree rooted at `id`, following build, link and
    /// run edges
    ///
    /// Edges that close a cross-type cycle are left out of the tree.
    #[must_use]
    pub fn to_spec(&self, id: NodeId) -> Spec {
        let mut path = Vec::new();
        self.spec_tree(id, &mut path)
    }

    fn spec_tree(&self, id: NodeId, path: &mut Vec<NodeId>) -> Spec {
        path.push(id);
        let mut spec = self.node_spec(id);
        for edge in &self.nodes[id.0].dependencies {
            if path.contains(&edge.target) {
                continue;
            }
            spec.dependencies.push(DependencySpec {
                spec: self.spec_tree(edge.target, path),
                types: edge.types,
            });
        }
        path.pop();
        spec
    }

    /// Serialize to the on-disk JSON form
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&DagFile::from(self))
    }

    /// Load and re-verify a graph written by [`ConcreteDag::to_json`]
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::MalformedGraph`] if the JSON is invalid,
    /// references unknown hashes, or a recomputed hash differs from the
    /// stored one.
    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        let malformed = |message: String| SpecError::MalformedGraph { message };
        let file: DagFile = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;

        let mut builder = DagBuilder::new();
        let mut ids = HashMap::new();
        for node in &file.nodes {
            let id = builder.add_node(NodeDraft {
                name: node.name.clone(),
                version: node.version.clone(),
                variants: node.variants.clone(),
                compiler: node.compiler.clone(),
                arch: node.arch.clone(),
                build_system: node.build_system,
            });
            ids.insert(node.hash.clone(), id);
        }
        for node in &file.nodes {
            let Some(&from) = ids.get(&node.hash) else {
                continue;
            };
            for dep in &node.dependencies {
                let to = *ids
                    .get(&dep.hash)
                    .ok_or_else(|| malformed(format!("unknown dependency {}", dep.hash)))?;
                builder.add_edge(from, to, dep.types);
            }
        }
        let roots = file
            .roots
            .iter()
            .map(|h| {
                ids.get(h)
                    .copied()
                    .ok_or_else(|| malformed(format!("unknown root {h}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let dag = builder.finish(&roots)?;
        for node in &file.nodes {
            if dag.find_hash(&node.hash).is_none() {
                return Err(malformed(format!(
                    "stored hash for {} does not match its contents",
                    node.name
                )));
            }
        }
        Ok(dag)
    }
}

impl fmt::Display for ConcreteDag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for root in &self.roots {
            let mut depth = HashMap::new();
            depth.insert(*root, 0usize);
            let order = self.traverse(*root, DepTypes::all());
            for id in order.iter().rev() {
                let level = depth.get(id).copied().unwrap_or(0);
                for dep in self.dependencies(*id, DepTypes::all()) {
                    depth.entry(dep).or_insert(level + 1);
                }
                let node = self.node(*id);
                writeln!(
                    f,
                    "{} {}{}",
                    node.hash.short(),
                    "    ".repeat(level),
                    self.format_node(*id)
                )?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct DagFileEdge {
    hash: Hash,
    types: DepTypes,
}

#[derive(Serialize, Deserialize)]
struct DagFileNode {
    hash: Hash,
    name: String,
    version: Version,
    variants: BTreeMap<String, VariantValue>,
    compiler: CompilerSpec,
    arch: ArchSpec,
    build_system: BuildSystemKind,
    dependencies: Vec<DagFileEdge>,
}

#[derive(Serialize, Deserialize)]
struct DagFile {
    roots: Vec<Hash>,
    nodes: Vec<DagFileNode>,
}

impl From<&ConcreteDag> for DagFile {
    fn from(dag: &ConcreteDag) -> Self {
        Self {
            roots: dag.roots.iter().map(|r| dag.node(*r).hash.clone()).collect(),
            nodes: dag
                .nodes
                .iter()
                .map(|n| DagFileNode {
                    hash: n.hash.clone(),
                    name: n.name.clone(),
                    version: n.version.clone(),
                    variants: n.variants.clone(),
                    compiler: n.compiler.clone(),
                    arch: n.arch.clone(),
                    build_system: n.build_system,
                    dependencies: n
                        .dependencies
                        .iter()
                        .map(|e| DagFileEdge {
                            hash: dag.node(e.target).hash.clone(),
                            types: e.types,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, version: &str) -> NodeDraft {
        NodeDraft {
            name: name.to_string(),
            version: Version::parse(version).unwrap(),
            variants: BTreeMap::new(),
            compiler: CompilerSpec::exact("gcc", Version::parse("12.2").unwrap()),
            arch: ArchSpec::new("linux", "debian12", "x86_64"),
            build_system: BuildSystemKind::Generic,
        }
    }

    fn diamond(reverse: bool) -> ConcreteDag {
        let mut b = DagBuilder::new();
        let names = if reverse {
            ["zlib", "libbar", "libfoo", "app"]
        } else {
            ["app", "libfoo", "libbar", "zlib"]
        };
        let mut ids = HashMap::new();
        for name in names {
            ids.insert(name, b.add_node(draft(name, "1.0")));
        }
        let edges = [("app", "libfoo"), ("app", "libbar"), ("libbar", "libfoo"), ("libfoo", "zlib")];
        let edges: Vec<_> = if reverse {
            edges.iter().rev().copied().collect()
        } else {
            edges.to_vec()
        };
        for (from, to) in edges {
            b.add_edge(ids[from], ids[to], DepTypes::BUILD_LINK);
        }
        b.finish(&[ids["app"]]).unwrap()
    }

    #[test]
    fn test_hash_ignores_construction_order() {
        let a = diamond(false);
        let b = diamond(true);
        for name in ["app", "libfoo", "libbar", "zlib"] {
            let ha = &a.node(a.find_name(name).unwrap()).hash;
            let hb = &b.node(b.find_name(name).unwrap()).hash;
            assert_eq!(ha, hb, "{name}");
        }
    }

    #[test]
    fn test_dag_hash_matches_spec_hash() {
        let dag = diamond(false);
        let app = dag.find_name("app").unwrap();
        let schema: BTreeMap<String, Vec<String>> = ["app", "libfoo", "libbar", "zlib"]
            .iter()
            .map(|n| ((*n).to_string(), Vec::new()))
            .collect();
        let spec = dag.to_spec(app);
        assert_eq!(spec.compute_hash(&schema).unwrap(), dag.node(app).hash);
    }

    #[test]
    fn test_run_only_cycle_is_rejected() {
        let mut b = DagBuilder::new();
        let x = b.add_node(draft("x", "1"));
        let y = b.add_node(draft("y", "1"));
        b.add_edge(x, y, DepTypes::RUN);
        b.add_edge(y, x, DepTypes::RUN | DepTypes::TEST);
        let err = b.finish(&[x]).unwrap_err();
        assert!(matches!(
            err,
            SpecError::MalformedGraph { ref message } if message.starts_with("run cycle")
        ));
    }

    #[test]
    fn test_cross_type_cycle_is_allowed() {
        let mut b = DagBuilder::new();
        let a = b.add_node(draft("a", "1"));
        let c = b.add_node(draft("c", "1"));
        b.add_edge(a, c, DepTypes::BUILD);
        b.add_edge(c, a, DepTypes::RUN);
        let dag = b.finish(&[a]).unwrap();
        assert_eq!(dag.traverse(a, DepTypes::BUILD_LINK), vec![c, a]);
        assert_eq!(dag.to_spec(a).dependencies.len(), 1);
    }

    #[test]
    fn test_build_cycle_is_rejected() {
        let mut b = DagBuilder::new();
        let x = b.add_node(draft("x", "1"));
        let y = b.add_node(draft("y", "1"));
        b.add_edge(x, y, DepTypes::BUILD);
        b.add_edge(y, x, DepTypes::BUILD);
        assert!(matches!(
            b.finish(&[x]),
            Err(SpecError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn test_json_roundtrip_reverifies_hashes() {
        let dag = diamond(false);
        let json = dag.to_json().unwrap();
        let back = ConcreteDag::from_json(&json).unwrap();
        assert_eq!(back.len(), dag.len());
        let root = back.roots()[0];
        assert_eq!(back.node(root).hash, dag.node(dag.roots()[0]).hash);

        let tampered = json.replacen("\"1.0\"", "\"9.9\"", 1);
        assert!(ConcreteDag::from_json(&tampered).is_err());
    }
}
