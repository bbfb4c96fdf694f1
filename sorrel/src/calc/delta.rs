use std::sync::Arc;

use crate::cache::ComputationCache;
use crate::depgraph::{DependencyGraph, DependencyNode};

/// Nodes of a graph split by whether their live data changed since the previous cycle.
#[derive(Debug, Clone, Default)]
pub struct DeltaResult {
    /// Nodes that need to be recomputed.
    pub changed: Vec<Arc<DependencyNode>>,
    /// Nodes whose outputs from the previous cycle are still valid.
    pub unchanged: Vec<Arc<DependencyNode>>,
}

/// Classifies nodes of a graph by comparing live data between two caches.
///
/// A live data sourcing node is changed when any of its outputs differs between the caches.
/// Any other node is changed when any node it (transitively) takes inputs from within the graph
/// is changed.
/// Nodes not depending on live data at all are unchanged.
///
/// Every node is classified exactly once, regardless of how many paths lead to it.
#[derive(Debug)]
pub struct LiveDataDeltaCalculator<'a> {
    graph: &'a DependencyGraph,
    cache: &'a dyn ComputationCache,
    previous_cache: &'a dyn ComputationCache,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done(bool),
}

impl<'a> LiveDataDeltaCalculator<'a> {
    /// Create calculator comparing `cache` against `previous_cache`.
    pub fn new(
        graph: &'a DependencyGraph,
        cache: &'a dyn ComputationCache,
        previous_cache: &'a dyn ComputationCache,
    ) -> Self {
        LiveDataDeltaCalculator {
            graph,
            cache,
            previous_cache,
        }
    }

    /// Classify every node of the graph.
    pub fn compute_delta(&self) -> DeltaResult {
        let nodes = self.graph.nodes();
        let mut marks = vec![Mark::Unvisited; nodes.len()];

        // Iterative post-order, graphs can be deep.
        for root in 0..nodes.len() {
            let mut stack = vec![root];

            while let Some(&index) = stack.last() {
                match marks[index] {
                    Mark::Done(_) => {
                        stack.pop();
                    }
                    Mark::Unvisited => {
                        marks[index] = Mark::InProgress;
                        stack.extend(
                            self.graph
                                .input_indices(index)
                                .filter(|&input| marks[input] == Mark::Unvisited),
                        );
                    }
                    Mark::InProgress => {
                        stack.pop();
                        marks[index] = Mark::Done(self.is_changed(index, &marks));
                    }
                }
            }
        }

        let mut result = DeltaResult::default();
        for (node, mark) in nodes.iter().zip(marks) {
            if mark == Mark::Done(true) {
                result.changed.push(node.clone());
            } else {
                result.unchanged.push(node.clone());
            }
        }

        result
    }

    fn is_changed(&self, index: usize, marks: &[Mark]) -> bool {
        let node = &self.graph.nodes()[index];

        if node.is_live_data_sourcing() {
            return node.output_values().iter().any(|output| {
                self.cache.get_value(output) != self.previous_cache.get_value(output)
            });
        }

        self.graph
            .input_indices(index)
            .any(|input| marks[input] == Mark::Done(true))
    }
}
