use std::collections::HashSet;
use std::fmt::{Debug, Formatter};

use parking_lot::RwLock;

use crate::depgraph::DependencyNode;

#[derive(Default)]
struct NodeSets {
    executed: HashSet<DependencyNode>,
    failed: HashSet<DependencyNode>,
}

/// Executed and failed nodes of one calculation configuration in one cycle.
///
/// Both sets sit behind a single reader/writer lock: queries take the read side, marks take the
/// write side.
///
/// Every method accepts `Option<&DependencyNode>`, and a plain `&DependencyNode` converts into it.
/// An absent node counts as both executed and failed, marking it does nothing.
#[derive(Default)]
pub struct NodeExecutionState {
    sets: RwLock<NodeSets>,
}

impl NodeExecutionState {
    /// Create state with nothing executed.
    pub fn new() -> Self {
        Default::default()
    }

    /// Check whether node was executed.
    pub fn is_executed<'a>(&self, node: impl Into<Option<&'a DependencyNode>>) -> bool {
        match node.into() {
            Some(node) => self.sets.read().executed.contains(node),
            None => true,
        }
    }

    /// Record node as executed.
    pub fn mark_executed<'a>(&self, node: impl Into<Option<&'a DependencyNode>>) {
        if let Some(node) = node.into() {
            self.sets.write().executed.insert(node.clone());
        }
    }

    /// Check whether node failed.
    pub fn is_failed<'a>(&self, node: impl Into<Option<&'a DependencyNode>>) -> bool {
        match node.into() {
            Some(node) => self.sets.read().failed.contains(node),
            None => true,
        }
    }

    /// Record node as failed.
    pub fn mark_failed<'a>(&self, node: impl Into<Option<&'a DependencyNode>>) {
        if let Some(node) = node.into() {
            self.sets.write().failed.insert(node.clone());
        }
    }

    /// Number of executed nodes.
    pub fn executed_count(&self) -> usize {
        self.sets.read().executed.len()
    }

    /// Number of failed nodes.
    pub fn failed_count(&self) -> usize {
        self.sets.read().failed.len()
    }
}

impl Debug for NodeExecutionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let guard = self.sets.read();

        f.debug_struct(stringify!(NodeExecutionState))
            .field("executed", &guard.executed.len())
            .field("failed", &guard.failed.len())
            .finish()
    }
}
