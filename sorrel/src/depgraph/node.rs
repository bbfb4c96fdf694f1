//! Dependency node: one function invocation with explicit inputs and outputs.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use crate::function::{FunctionKind, ParameterizedFunction};
use crate::value::{ComputationTargetSpecification, ValueSpecification};

/// One function invocation within a dependency graph.
///
/// Nodes are immutable once built.
/// Identity is structural: two nodes invoking the same function on the same target with the same
/// inputs and outputs are the same node, which is what executed/failed node sets rely on.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct DependencyNode {
    function: ParameterizedFunction,
    target: ComputationTargetSpecification,
    inputs: Vec<ValueSpecification>,
    outputs: BTreeSet<ValueSpecification>,
}

impl DependencyNode {
    /// Create a node with no inputs or outputs.
    pub fn new(function: ParameterizedFunction, target: ComputationTargetSpecification) -> Self {
        DependencyNode {
            function,
            target,
            inputs: Vec::new(),
            outputs: BTreeSet::new(),
        }
    }

    /// Append an input value.
    ///
    /// Inputs are ordered: they are handed to the function in the order they were added.
    pub fn with_input(mut self, input: ValueSpecification) -> Self {
        if !self.inputs.contains(&input) {
            self.inputs.push(input);
        }
        self
    }

    /// Add an output value.
    pub fn with_output(mut self, output: ValueSpecification) -> Self {
        self.outputs.insert(output);
        self
    }

    /// Invoked function.
    pub fn function(&self) -> &ParameterizedFunction {
        &self.function
    }

    /// Target of the invocation.
    pub fn target(&self) -> &ComputationTargetSpecification {
        &self.target
    }

    /// Ordered input values.
    pub fn input_values(&self) -> &[ValueSpecification] {
        &self.inputs
    }

    /// Output values.
    pub fn output_values(&self) -> &BTreeSet<ValueSpecification> {
        &self.outputs
    }

    /// Check whether the node merely exposes live data.
    pub fn is_live_data_sourcing(&self) -> bool {
        self.function.kind() == FunctionKind::LiveDataSourcing
    }
}

impl Display for DependencyNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DepNode[{} on {}, {} in, {} out]",
            self.function.function_id(),
            self.target,
            self.inputs.len(),
            self.outputs.len()
        )
    }
}
