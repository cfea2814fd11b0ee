//! Effective step properties, inherited along the ancestor chain
//!
//! Four merge policies cover every field:
//! - [`ordered_concat`]: values from the root down to the node, in that order
//! - [`set_union`]: union of every ancestor's set
//! - [`closest_wins`]: first value found walking from the node upwards
//! - [`keyed_closest_wins`]: per key, the closest definition shadows farther ones

use crate::core::config::{ContainerOptions, FileRule};
use crate::core::step::{NodeId, StepNode, StepTree};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Values used when no node in the chain defines timeout or retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefaults {
    pub retry: u32,
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            retry: 0,
            timeout_secs: 3600,
        }
    }
}

/// Collect non-empty values from the root down to the node
pub fn ordered_concat<'a, F>(tree: &'a StepTree, id: NodeId, field: F) -> Vec<String>
where
    F: Fn(&'a StepNode) -> Option<&'a str>,
{
    let mut values: Vec<String> = tree
        .ancestors(id)
        .filter_map(&field)
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .collect();
    values.reverse();
    values
}

/// Union of every set along the chain
pub fn set_union<'a, F>(tree: &'a StepTree, id: NodeId, field: F) -> BTreeSet<String>
where
    F: Fn(&'a StepNode) -> &'a BTreeSet<String>,
{
    tree.ancestors(id).flat_map(|n| field(n).iter().cloned()).collect()
}

/// First value found walking from the node up to the root
pub fn closest_wins<'a, T, F>(tree: &'a StepTree, id: NodeId, field: F) -> Option<T>
where
    F: Fn(&'a StepNode) -> Option<T>,
{
    tree.ancestors(id).find_map(field)
}

/// Items from the node upwards, keeping only the first item seen per key
pub fn keyed_closest_wins<'a, T, I, F, K>(tree: &'a StepTree, id: NodeId, items: F, key: K) -> Vec<T>
where
    F: Fn(&'a StepNode) -> I,
    I: IntoIterator<Item = T>,
    K: Fn(&T) -> String,
{
    let mut seen = HashSet::new();
    let mut output = Vec::new();

    for node in tree.ancestors(id) {
        for item in items(node) {
            if seen.insert(key(&item)) {
                output.push(item);
            }
        }
    }

    output
}

pub fn fetch_bash(tree: &StepTree, id: NodeId) -> Vec<String> {
    ordered_concat(tree, id, |n| n.bash.as_deref())
}

pub fn fetch_pwsh(tree: &StepTree, id: NodeId) -> Vec<String> {
    ordered_concat(tree, id, |n| n.pwsh.as_deref())
}

pub fn fetch_conditions(tree: &StepTree, id: NodeId) -> Vec<String> {
    ordered_concat(tree, id, |n| n.condition.as_deref())
}

pub fn fetch_exports(tree: &StepTree, id: NodeId) -> BTreeSet<String> {
    set_union(tree, id, |n| &n.exports)
}

pub fn fetch_secrets(tree: &StepTree, id: NodeId) -> BTreeSet<String> {
    set_union(tree, id, |n| &n.secrets)
}

pub fn fetch_configs(tree: &StepTree, id: NodeId) -> BTreeSet<String> {
    set_union(tree, id, |n| &n.configs)
}

pub fn fetch_timeout(tree: &StepTree, id: NodeId, default: u64) -> u64 {
    closest_wins(tree, id, |n| n.timeout).unwrap_or(default)
}

pub fn fetch_retry(tree: &StepTree, id: NodeId, default: u32) -> u32 {
    closest_wins(tree, id, |n| n.retry).unwrap_or(default)
}

pub fn fetch_agents(tree: &StepTree, id: NodeId) -> Vec<String> {
    closest_wins(tree, id, |n| (!n.agents.is_empty()).then(|| n.agents.clone())).unwrap_or_default()
}

pub fn fetch_docker(tree: &StepTree, id: NodeId) -> Option<ContainerOptions> {
    closest_wins(tree, id, |n| n.docker.clone())
}

pub fn fetch_caches(tree: &StepTree, id: NodeId) -> Vec<FileRule> {
    keyed_closest_wins(tree, id, |n| n.caches.iter().cloned(), |r: &FileRule| r.name.clone())
}

pub fn fetch_artifacts(tree: &StepTree, id: NodeId) -> Vec<FileRule> {
    keyed_closest_wins(tree, id, |n| n.artifacts.iter().cloned(), |r: &FileRule| r.name.clone())
}

pub fn fetch_vars(tree: &StepTree, id: NodeId) -> IndexMap<String, String> {
    keyed_closest_wins(
        tree,
        id,
        |n| n.vars.iter().map(|(k, v)| (k.clone(), v.clone())),
        |(k, _): &(String, String)| k.clone(),
    )
    .into_iter()
    .collect()
}

/// Everything an agent driver needs to run one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveStepProperties {
    pub name: String,
    pub path: String,
    pub bash: Vec<String>,
    pub pwsh: Vec<String>,
    pub conditions: Vec<String>,
    pub exports: BTreeSet<String>,
    pub secrets: BTreeSet<String>,
    pub configs: BTreeSet<String>,
    pub timeout_secs: u64,
    pub retry: u32,
    pub caches: Vec<FileRule>,
    pub artifacts: Vec<FileRule>,
    pub vars: IndexMap<String, String>,
    pub agents: Vec<String>,
    pub docker: Option<ContainerOptions>,
    pub plugin: Option<String>,
    pub allow_failure: bool,
    pub post: bool,
}

/// Resolve all inherited properties of one node
pub fn resolve(tree: &StepTree, id: NodeId, defaults: &StepDefaults) -> EffectiveStepProperties {
    let node = tree.node(id);

    EffectiveStepProperties {
        name: node.name.clone(),
        path: node.path.to_string(),
        bash: fetch_bash(tree, id),
        pwsh: fetch_pwsh(tree, id),
        conditions: fetch_conditions(tree, id),
        exports: fetch_exports(tree, id),
        secrets: fetch_secrets(tree, id),
        configs: fetch_configs(tree, id),
        timeout_secs: fetch_timeout(tree, id, defaults.timeout_secs),
        retry: fetch_retry(tree, id, defaults.retry),
        caches: fetch_caches(tree, id),
        artifacts: fetch_artifacts(tree, id),
        vars: fetch_vars(tree, id),
        agents: fetch_agents(tree, id),
        docker: fetch_docker(tree, id),
        plugin: node.plugin.clone(),
        allow_failure: node.allow_failure,
        post: node.post,
    }
}
