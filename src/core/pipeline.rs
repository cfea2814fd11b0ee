//! Execution graph compiled from a step tree
//!
//! Steps on one level run sequentially by default. `dependencies` name any
//! other step as a predecessor instead, which allows fan-out and fan-in. A
//! stage behaves as a single node from the outside: depending on it means
//! depending on its exit node, the last step of its internal chain.

use crate::core::config::FlowDocument;
use crate::core::error::{PipelineError, Result};
use crate::core::properties::{resolve, EffectiveStepProperties, StepDefaults};
use crate::core::step::{NodeId, StepNode, StepTree};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::debug;

/// Graph adjacency of one step. Parents and children are independent lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub step: NodeId,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    /// For stages, the node that stands in for the stage as a dependency
    pub exit: Option<NodeId>,
}

impl GraphNode {
    fn new(step: NodeId) -> Self {
        Self {
            step,
            parents: Vec::new(),
            children: Vec::new(),
            exit: None,
        }
    }
}

/// Compile a merged flow into its execution graph
pub fn compile(flow: &FlowDocument) -> Result<ExecutionGraph> {
    ExecutionGraph::build(StepTree::build(flow)?)
}

/// Directed acyclic graph over the steps of one flow
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    tree: StepTree,
    nodes: Vec<GraphNode>,
}

impl ExecutionGraph {
    pub fn build(tree: StepTree) -> Result<Self> {
        let mut nodes: Vec<GraphNode> = tree.iter().map(|s| GraphNode::new(s.id)).collect();

        // Reverse pre-order visits every descendant before its ancestors,
        // so a nested stage's exit is known when its parent needs it.
        for step in tree.iter().rev() {
            if !step.is_stage() {
                continue;
            }
            if let Some(&last) = step.children.last() {
                nodes[step.id.index()].exit = Some(nodes[last.index()].exit.unwrap_or(last));
            }
        }

        let mut graph = Self { tree, nodes };
        graph.connect_level(NodeId::ROOT)?;
        graph.check_cycles()?;

        debug!(
            "Compiled graph '{}' with {} nodes",
            graph.tree.root().name,
            graph.nodes.len()
        );
        Ok(graph)
    }

    /// Wire the direct steps of `start` and return the chain's exit node
    fn connect_level(&mut self, start: NodeId) -> Result<NodeId> {
        let mut current = start;
        let steps = self.tree.node(start).children.clone();

        for id in steps {
            let step = self.tree.node(id);

            if step.dependencies.is_empty() {
                self.connect(current, id);
            } else {
                let mut sources = Vec::with_capacity(step.dependencies.len());
                for dependency in &step.dependencies {
                    let dep = self.tree.id_of(dependency).ok_or_else(|| {
                        PipelineError::UnresolvedDependency {
                            step: step.name.clone(),
                            dependency: dependency.clone(),
                        }
                    })?;
                    sources.push(self.exit_of(dep));
                }
                for source in sources {
                    self.connect(source, id);
                }
            }

            current = if self.tree.node(id).is_stage() {
                self.connect_level(id)?
            } else {
                id
            };
        }

        Ok(current)
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        if self.nodes[from.index()].children.contains(&to) {
            return;
        }
        self.nodes[from.index()].children.push(to);
        self.nodes[to.index()].parents.push(from);
    }

    fn check_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for node in &self.nodes {
            if !visited.contains(&node.step) {
                self.dfs_check(node.step, &mut visited, &mut stack)?;
            }
        }
        Ok(())
    }

    fn dfs_check(
        &self,
        id: NodeId,
        visited: &mut HashSet<NodeId>,
        stack: &mut Vec<NodeId>,
    ) -> Result<()> {
        visited.insert(id);
        stack.push(id);

        for &child in &self.nodes[id.index()].children {
            if let Some(pos) = stack.iter().position(|&s| s == child) {
                let mut cycle: Vec<String> = stack[pos..].iter().map(|&s| self.name(s).to_string()).collect();
                cycle.push(self.name(child).to_string());
                return Err(PipelineError::CyclicDependency { cycle });
            }
            if !visited.contains(&child) {
                self.dfs_check(child, visited, stack)?;
            }
        }

        stack.pop();
        Ok(())
    }

    pub fn tree(&self) -> &StepTree {
        &self.tree
    }

    pub fn root(&self) -> &GraphNode {
        &self.nodes[NodeId::ROOT.index()]
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.index()]
    }

    /// Graph node by step name
    pub fn get(&self, name: &str) -> Option<&GraphNode> {
        self.tree.id_of(name).map(|id| self.node(id))
    }

    /// Node that stands in for `id` as a dependency source
    pub fn exit_of(&self, id: NodeId) -> NodeId {
        self.nodes[id.index()].exit.unwrap_or(id)
    }

    pub fn step(&self, id: NodeId) -> &StepNode {
        self.tree.node(id)
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.tree.node(id).name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.nodes.iter()
    }

    /// Successors of a node
    pub fn next(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Predecessors of a node
    pub fn previous(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].parents
    }

    /// Every node reachable from `id`, excluding `id`, in breadth-first order
    pub fn skip(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeId> = self.next(id).iter().copied().collect();
        let mut output = Vec::new();

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            output.push(next);
            queue.extend(self.next(next).iter().copied());
        }

        output
    }

    /// A node is ready once every parent has settled
    pub fn is_ready(&self, id: NodeId, settled: &HashSet<NodeId>) -> bool {
        self.previous(id).iter().all(|p| settled.contains(p))
    }

    /// Kahn ordering; ties are broken by declaration order
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.parents.len()).collect();
        let mut ready: BTreeSet<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.parents.is_empty())
            .map(|n| n.step)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_first() {
            order.push(id);
            for &child in self.next(id) {
                in_degree[child.index()] -= 1;
                if in_degree[child.index()] == 0 {
                    ready.insert(child);
                }
            }
        }

        order
    }

    /// Effective properties of a step, for dispatch
    pub fn resolve(&self, id: NodeId, defaults: &StepDefaults) -> EffectiveStepProperties {
        resolve(&self.tree, id, defaults)
    }

    /// Serializable snapshot used by the CLI
    pub fn to_view(&self) -> Vec<GraphNodeView> {
        self.topological_order()
            .into_iter()
            .map(|id| {
                let node = self.node(id);
                let names = |ids: &[NodeId]| -> Vec<String> {
                    ids.iter().map(|&i| self.name(i).to_string()).collect()
                };
                GraphNodeView {
                    name: self.name(id).to_string(),
                    path: self.step(id).path.to_string(),
                    parents: names(&node.parents),
                    children: names(&node.children),
                    exit: node.exit.map(|e| self.name(e).to_string()),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNodeView {
    pub name: String,
    pub path: String,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<String>,
}
