//! Dependency graphs and sub-graph extraction.
//!
//! A [`DependencyGraph`] is the compiled form of one calculation configuration: a set of
//! [`DependencyNode`]s wired together by value specifications.
//! A node depends on another node within the graph whenever one of its inputs is an output of
//! that other node.
//! Inputs with no producer inside the graph (for example live data fed straight into caches) are
//! simply not edges.
//!
//! Graphs are read-only once built and shared between a view and every cycle run for it,
//! so nodes are kept behind [`Arc`].
//! [`DependencyGraph::sub_graph`] never mutates its source: it produces a new graph referencing
//! the same node allocations.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use crate::value::ValueSpecification;

mod node;

pub use node::DependencyNode;

/// Directed acyclic graph of function invocations for one calculation configuration.
#[derive(Clone, Default)]
pub struct DependencyGraph {
    calculation_configuration_name: String,
    nodes: Vec<Arc<DependencyNode>>,
    producers: HashMap<ValueSpecification, usize>,
    terminal_outputs: BTreeSet<ValueSpecification>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new(calculation_configuration_name: impl Into<String>) -> Self {
        DependencyGraph {
            calculation_configuration_name: calculation_configuration_name.into(),
            ..Default::default()
        }
    }

    /// Name of the calculation configuration the graph was compiled for.
    pub fn calculation_configuration_name(&self) -> &str {
        &self.calculation_configuration_name
    }

    /// Add a node.
    ///
    /// Adding a node which is already present is a no-op returning the existing allocation.
    pub fn add_node(&mut self, node: DependencyNode) -> Arc<DependencyNode> {
        if let Some(existing) = self.nodes.iter().find(|n| ***n == node) {
            return existing.clone();
        }

        let node = Arc::new(node);
        self.insert(node.clone());

        node
    }

    fn insert(&mut self, node: Arc<DependencyNode>) {
        let index = self.nodes.len();
        for output in node.output_values() {
            self.producers.insert(output.clone(), index);
        }
        self.nodes.push(node);
    }

    /// Declare an output as terminal, i.e. requested by the view itself rather than consumed by
    /// other nodes only.
    ///
    /// Returns `false` when no node in the graph produces `output`.
    pub fn add_terminal_output(&mut self, output: ValueSpecification) -> bool {
        if self.producers.contains_key(&output) {
            self.terminal_outputs.insert(output);
            true
        } else {
            false
        }
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[Arc<DependencyNode>] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check whether `node` is part of the graph.
    pub fn contains(&self, node: &DependencyNode) -> bool {
        node.output_values()
            .iter()
            .next()
            .and_then(|output| self.producers.get(output))
            .map(|&i| *self.nodes[i] == *node)
            .unwrap_or_else(|| self.nodes.iter().any(|n| **n == *node))
    }

    /// All values produced by nodes of the graph.
    pub fn output_values(&self) -> impl Iterator<Item = &ValueSpecification> + '_ {
        self.nodes.iter().flat_map(|node| node.output_values())
    }

    /// Outputs requested by the view.
    pub fn terminal_output_values(&self) -> &BTreeSet<ValueSpecification> {
        &self.terminal_outputs
    }

    /// Check whether `output` is a terminal output.
    pub fn is_terminal_output(&self, output: &ValueSpecification) -> bool {
        self.terminal_outputs.contains(output)
    }

    /// Node producing `output`, if any.
    pub fn producer_of(&self, output: &ValueSpecification) -> Option<&Arc<DependencyNode>> {
        self.producers.get(output).map(|&i| &self.nodes[i])
    }

    /// Nodes of this graph the given node takes inputs from.
    pub fn input_nodes(&self, node: &DependencyNode) -> Vec<&Arc<DependencyNode>> {
        let mut seen = HashSet::new();

        node.input_values()
            .iter()
            .filter_map(|input| self.producers.get(input).copied())
            .filter(|&i| seen.insert(i))
            .map(|i| &self.nodes[i])
            .collect()
    }

    /// Indices of nodes the node at `index` takes inputs from.
    pub(crate) fn input_indices(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[index]
            .input_values()
            .iter()
            .filter_map(move |input| self.producers.get(input).copied())
            .filter(move |&i| i != index)
    }

    /// Produce a new graph containing exactly the nodes accepted by `predicate`.
    ///
    /// The predicate is evaluated once per node, in insertion order.
    /// Accepted nodes are shared with the source graph, not copied.
    pub fn sub_graph<P>(&self, mut predicate: P) -> DependencyGraph
    where
        P: FnMut(&DependencyNode) -> bool,
    {
        let mut graph = DependencyGraph::new(self.calculation_configuration_name.clone());

        for node in self.nodes.iter().filter(|node| predicate(node)) {
            graph.insert(node.clone());
        }

        graph.terminal_outputs = self
            .terminal_outputs
            .iter()
            .filter(|output| graph.producers.contains_key(*output))
            .cloned()
            .collect();

        graph
    }
}

impl Debug for DependencyGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        struct Wrapper(usize);

        impl Debug for Wrapper {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "[..; {}]", self.0)
            }
        }

        f.debug_struct(stringify!(DependencyGraph))
            .field(
                "calculation_configuration_name",
                &self.calculation_configuration_name,
            )
            .field("nodes", &Wrapper(self.nodes.len()))
            .field("terminal_outputs", &Wrapper(self.terminal_outputs.len()))
            .finish()
    }
}

impl Display for DependencyGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DependencyGraph[{}, {} nodes]",
            self.calculation_configuration_name,
            self.nodes.len()
        )
    }
}
