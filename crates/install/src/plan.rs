//! Build plans
//!
//! A plan covers the build/link closure of every root plus the closures of
//! each root's direct run and test dependencies. Run edges below the roots
//! are not followed. Nodes the store already reports installed stay in the
//! plan as [`PlanAction::AlreadyInstalled`] so dependents can order against
//! them, but nothing is built for them.

use sprig_errors::{Error, StoreError};
use sprig_hash::Hash;
use sprig_spec::{ConcreteDag, ConcreteNode, NodeId};
use sprig_store::InstallStore;
use sprig_types::DepTypes;
use std::collections::HashMap;
use std::sync::Arc;

/// What the scheduler does with a planned node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Build,
    AlreadyInstalled,
}

#[derive(Debug, Clone)]
pub struct PlannedNode {
    pub id: NodeId,
    pub action: PlanAction,
    /// Requested as a root
    pub explicit: bool,
    /// Positions in the plan of this node's build/link dependencies
    pub(crate) dependencies: Vec<usize>,
}

/// Topologically ordered build list over a concrete DAG
#[derive(Debug, Clone)]
pub struct BuildPlan {
    dag: Arc<ConcreteDag>,
    nodes: Vec<PlannedNode>,
    /// Position of each planned node's hash
    positions: HashMap<Hash, usize>,
}

impl BuildPlan {
    /// Compute the plan for every root of `dag`
    ///
    /// A corrupt store record is logged and the node is planned for a
    /// rebuild; the rebuild happens under the hash lock and replaces the
    /// record.
    ///
    /// # Errors
    ///
    /// Returns a store error other than [`StoreError::CorruptRecord`]
    /// raised while checking install state.
    pub async fn new(dag: Arc<ConcreteDag>, store: &InstallStore) -> Result<Self, Error> {
        let order = build_order(&dag);
        let mut positions = HashMap::with_capacity(order.len());
        for (pos, id) in order.iter().enumerate() {
            positions.insert(dag.node(*id).hash.clone(), pos);
        }

        let mut nodes = Vec::with_capacity(order.len());
        for id in &order {
            let node = dag.node(*id);
            let action = match store.is_installed(&node.hash).await {
                Ok(true) => PlanAction::AlreadyInstalled,
                Ok(false) => PlanAction::Build,
                Err(StoreError::CorruptRecord { message, .. }) => {
                    tracing::warn!(
                        package = %node.name,
                        hash = %node.hash,
                        error = %message,
                        "corrupt install record; planning a rebuild"
                    );
                    PlanAction::Build
                }
                Err(e) => return Err(e.into()),
            };
            let dependencies = dag
                .dependencies(*id, DepTypes::BUILD_LINK)
                .filter_map(|dep| positions.get(&dag.node(dep).hash).copied())
                .collect();
            nodes.push(PlannedNode {
                id: *id,
                action,
                explicit: dag.roots().contains(id),
                dependencies,
            });
        }

        let plan = Self {
            dag,
            nodes,
            positions,
        };
        tracing::info!(
            nodes = plan.len(),
            to_build = plan.to_build(),
            "build plan ready"
        );
        Ok(plan)
    }

    #[must_use]
    pub fn dag(&self) -> &Arc<ConcreteDag> {
        &self.dag
    }

    /// Planned nodes, dependencies before dependents
    #[must_use]
    pub fn nodes(&self) -> &[PlannedNode] {
        &self.nodes
    }

    #[must_use]
    pub fn node(&self, pos: usize) -> &ConcreteNode {
        self.dag.node(self.nodes[pos].id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn to_build(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.action == PlanAction::Build)
            .count()
    }

    #[must_use]
    pub fn contains(&self, hash: &Hash) -> bool {
        self.positions.contains_key(hash)
    }

    /// Planned nodes by package name, in plan order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| self.dag.node(n.id).name.as_str())
    }

    /// Plan positions of the nodes depending on each position
    pub(crate) fn dependents(&self) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); self.nodes.len()];
        for (pos, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                out[*dep].push(pos);
            }
        }
        out
    }
}

/// Post-order over the roots' build/link closures and their direct
/// run/test dependencies
fn build_order(dag: &ConcreteDag) -> Vec<NodeId> {
    let mut seen = vec![false; dag.len()];
    let mut order = Vec::new();
    let mut push_closure = |start: NodeId, order: &mut Vec<NodeId>| {
        for id in dag.traverse(start, DepTypes::BUILD_LINK) {
            if !seen[id.index()] {
                seen[id.index()] = true;
                order.push(id);
            }
        }
    };

    for root in dag.roots() {
        for dep in dag.dependencies(*root, DepTypes::RUN | DepTypes::TEST) {
            push_closure(dep, &mut order);
        }
        push_closure(*root, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_spec::{DagBuilder, NodeDraft};
    use sprig_types::{ArchSpec, BuildSystemKind, CompilerSpec, Version};
    use std::collections::BTreeMap;

    fn draft(name: &str) -> NodeDraft {
        NodeDraft {
            name: name.to_string(),
            version: Version::parse("1.0").unwrap(),
            variants: BTreeMap::new(),
            compiler: CompilerSpec::exact("gcc", Version::parse("12.3").unwrap()),
            arch: ArchSpec::new("linux", "ubuntu22.04", "x86_64"),
            build_system: BuildSystemKind::Generic,
        }
    }

    #[test]
    fn test_run_edges_followed_only_from_roots() {
        // app -(run)-> tool -(run)-> helper ; tool -(build)-> zlib ; app -(link)-> libfoo
        let mut builder = DagBuilder::new();
        let app = builder.add_node(draft("app"));
        let tool = builder.add_node(draft("tool"));
        let helper = builder.add_node(draft("helper"));
        let zlib = builder.add_node(draft("zlib"));
        let libfoo = builder.add_node(draft("libfoo"));
        builder.add_edge(app, tool, DepTypes::RUN);
        builder.add_edge(tool, helper, DepTypes::RUN);
        builder.add_edge(tool, zlib, DepTypes::BUILD);
        builder.add_edge(app, libfoo, DepTypes::LINK);
        let dag = builder.finish(&[app]).unwrap();

        let names: Vec<&str> = build_order(&dag)
            .into_iter()
            .map(|id| dag.node(id).name.as_str())
            .collect();
        assert_eq!(names, ["zlib", "tool", "libfoo", "app"]);
    }

    #[test]
    fn test_shared_dependency_listed_once() {
        let mut builder = DagBuilder::new();
        let a = builder.add_node(draft("a"));
        let b = builder.add_node(draft("b"));
        let shared = builder.add_node(draft("shared"));
        builder.add_edge(a, shared, DepTypes::BUILD_LINK);
        builder.add_edge(b, shared, DepTypes::BUILD_LINK);
        let dag = builder.finish(&[a, b]).unwrap();

        let order = build_order(&dag);
        assert_eq!(order.len(), 3);
        assert_eq!(dag.node(order[0]).name, "shared");
    }
}
