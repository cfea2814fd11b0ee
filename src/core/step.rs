//! Step tree built from a merged flow document

use crate::core::config::{ContainerOptions, FileRule, FlowDocument, StepDocument};
use crate::core::error::{PipelineError, Result};
use crate::core::path::NodePath;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::ops::Index;
use tracing::debug;

/// Index of a node inside its [`StepTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// A single node of the step tree.
///
/// The root node represents the flow itself; every other node is a step.
/// `parent` and `children` are indices into the owning tree.
#[derive(Debug, Clone, Serialize)]
pub struct StepNode {
    #[serde(skip)]
    pub id: NodeId,

    pub name: String,

    pub path: NodePath,

    #[serde(skip)]
    pub parent: Option<NodeId>,

    #[serde(skip)]
    pub children: Vec<NodeId>,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub vars: IndexMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker: Option<ContainerOptions>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pwsh: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    pub post: bool,

    pub allow_failure: bool,

    /// Timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,

    pub exports: BTreeSet<String>,

    pub secrets: BTreeSet<String>,

    pub configs: BTreeSet<String>,

    pub caches: Vec<FileRule>,

    pub artifacts: Vec<FileRule>,

    /// Names of predecessor steps, resolved by the graph builder
    pub dependencies: Vec<String>,
}

impl StepNode {
    fn root(flow: &FlowDocument, path: NodePath) -> Self {
        Self {
            id: NodeId::ROOT,
            name: path.name().to_string(),
            path,
            parent: None,
            children: Vec::new(),
            vars: flow.vars.clone(),
            condition: flow.condition.clone(),
            docker: flow.docker.clone(),
            agents: flow.agents.clone(),
            bash: None,
            pwsh: None,
            plugin: None,
            post: false,
            allow_failure: false,
            timeout: None,
            retry: None,
            exports: BTreeSet::new(),
            secrets: BTreeSet::new(),
            configs: BTreeSet::new(),
            caches: Vec::new(),
            artifacts: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    fn from_document(id: NodeId, path: NodePath, parent: NodeId, doc: &StepDocument) -> Self {
        Self {
            id,
            name: path.name().to_string(),
            path,
            parent: Some(parent),
            children: Vec::new(),
            vars: doc.vars.clone(),
            condition: doc.condition.clone(),
            docker: doc.docker.clone(),
            agents: doc.agents.clone(),
            bash: doc.effective_bash().map(str::to_string),
            pwsh: doc.pwsh.clone(),
            plugin: doc.plugin.clone(),
            post: doc.post.unwrap_or(false),
            allow_failure: doc.allow_failure.unwrap_or(false),
            timeout: doc.timeout,
            retry: doc.retry,
            exports: doc.exports.iter().cloned().collect(),
            secrets: doc.secrets.iter().cloned().collect(),
            configs: doc.configs.iter().cloned().collect(),
            caches: doc.caches.clone(),
            artifacts: doc.artifacts.clone(),
            dependencies: doc.dependencies.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// A stage is a step with nested steps
    pub fn is_stage(&self) -> bool {
        !self.is_root() && !self.children.is_empty()
    }

    /// Leaf steps are the ones dispatched to agents
    pub fn is_leaf(&self) -> bool {
        !self.is_root() && self.children.is_empty()
    }
}

/// Arena owning every node of a compiled flow, plus a flat name index
#[derive(Debug, Clone)]
pub struct StepTree {
    nodes: Vec<StepNode>,
    index: HashMap<String, NodeId>,
}

impl StepTree {
    /// Materialize the tree of a merged flow document.
    ///
    /// Step names are unique across the whole tree, not only among siblings.
    pub fn build(flow: &FlowDocument) -> Result<Self> {
        let root_path = NodePath::root(flow.flow_name())?;
        let mut tree = StepTree {
            nodes: vec![StepNode::root(flow, root_path)],
            index: HashMap::new(),
        };

        tree.add_steps(NodeId::ROOT, &flow.steps)?;
        debug!("Built step tree '{}' with {} steps", flow.flow_name(), tree.index.len());
        Ok(tree)
    }

    fn add_steps(&mut self, parent: NodeId, steps: &IndexMap<String, StepDocument>) -> Result<()> {
        for (name, doc) in steps {
            let path = self.nodes[parent.0].path.child(name)?;
            let name = path.name().to_string();

            if self.index.contains_key(&name) {
                return Err(PipelineError::DuplicateName {
                    name,
                    path: path.to_string(),
                });
            }

            if doc.is_stage() && doc.plugin.is_some() {
                return Err(PipelineError::format(format!(
                    "{}: plugin is not allowed on a step with nested steps",
                    path
                )));
            }

            if !doc.is_stage()
                && doc.effective_bash().is_none()
                && doc.pwsh.is_none()
                && doc.plugin.is_none()
            {
                return Err(PipelineError::format(format!(
                    "{}: step must define bash, pwsh, plugin or steps",
                    path
                )));
            }

            let id = NodeId(self.nodes.len());
            self.nodes.push(StepNode::from_document(id, path, parent, doc));
            self.nodes[parent.0].children.push(id);
            self.index.insert(name, id);

            self.add_steps(id, &doc.steps)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &StepNode {
        &self.nodes[NodeId::ROOT.0]
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> &StepNode {
        &self.nodes[id.0]
    }

    /// Look up a step by its globally unique name
    pub fn find(&self, name: &str) -> Option<&StepNode> {
        self.index.get(name).map(|id| &self.nodes[id.0])
    }

    /// Look up a node by its full path, e.g. `root/build/compile`
    pub fn find_by_path(&self, path: &str) -> Option<&StepNode> {
        let path = NodePath::parse(path).ok()?;
        self.nodes.iter().find(|n| n.path == path)
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<&StepNode> {
        self.nodes[id.0].parent.map(|p| &self.nodes[p.0])
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &StepNode> + '_ {
        self.nodes[id.0].children.iter().map(move |c| &self.nodes[c.0])
    }

    /// Walk from `id` up to the root, `id` included
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(id),
        }
    }

    /// Every node in depth-first declaration order, root first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &StepNode> + ExactSizeIterator + '_ {
        self.nodes.iter()
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

impl Index<NodeId> for StepTree {
    type Output = StepNode;

    fn index(&self, id: NodeId) -> &StepNode {
        self.node(id)
    }
}

/// Bottom-up iterator over a node and its ancestors
pub struct Ancestors<'a> {
    tree: &'a StepTree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a StepNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.node(self.next?);
        self.next = node.parent;
        Some(node)
    }
}
