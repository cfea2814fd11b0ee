//! Execution scheduler - determines which steps can run next
//!
//! Readiness is an in-degree countdown over the execution graph: a node
//! becomes ready once every one of its parents has settled.

use crate::core::{ExecutionGraph, NodeId};
use std::collections::{BTreeSet, HashSet};

pub struct ExecutionScheduler {
    remaining: Vec<usize>,
    ready: BTreeSet<NodeId>,
    settled: HashSet<NodeId>,
    total: usize,
}

impl ExecutionScheduler {
    pub fn new(graph: &ExecutionGraph) -> Self {
        let remaining: Vec<usize> = graph.nodes().map(|n| n.parents.len()).collect();
        let ready = graph
            .nodes()
            .filter(|n| n.parents.is_empty())
            .map(|n| n.step)
            .collect();

        Self {
            remaining,
            ready,
            settled: HashSet::new(),
            total: graph.len(),
        }
    }

    /// Take the earliest declared ready node
    pub fn pop_ready(&mut self) -> Option<NodeId> {
        self.ready.pop_first()
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Mark a node as settled and return the children it unblocked
    pub fn settle(&mut self, graph: &ExecutionGraph, id: NodeId) -> Vec<NodeId> {
        if !self.settled.insert(id) {
            return Vec::new();
        }

        let mut unblocked = Vec::new();
        for &child in graph.next(id) {
            let remaining = &mut self.remaining[child.index()];
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 && self.ready.insert(child) {
                unblocked.push(child);
            }
        }
        unblocked
    }

    pub fn is_settled(&self, id: NodeId) -> bool {
        self.settled.contains(&id)
    }

    pub fn settled(&self) -> &HashSet<NodeId> {
        &self.settled
    }

    /// True once every node of the graph has settled
    pub fn is_complete(&self) -> bool {
        self.settled.len() == self.total
    }
}
