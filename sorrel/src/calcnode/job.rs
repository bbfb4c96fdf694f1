//! Calculation job items: dispatchable units of work.

use crate::cache::IdentifierMap;
use crate::depgraph::DependencyNode;
use crate::function::FunctionParameters;
use crate::value::{ComputationTargetSpecification, ValueRequirement};
use crate::wire::{DecodeError, WireCodec, WireMessage, WireValue};

const TARGET_SPECIFICATION: &str = "computationTargetSpecification";
const FUNCTION_UNIQUE_ID: &str = "functionUniqueIdentifier";
const FUNCTION_PARAMETERS: &str = "functionParameters";
const VALUE_INPUT: &str = "valueInput";
const DESIRED_VALUE: &str = "desiredValue";

/// One function invocation, in the form it is shipped to a calculation node.
///
/// Inputs are referenced by the numeric identifiers of an [`IdentifierMap`] shared between
/// sender and receiver instead of by full value specifications.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CalculationJobItem {
    function_unique_id: String,
    function_parameters: FunctionParameters,
    computation_target_specification: ComputationTargetSpecification,
    input_identifiers: Vec<i64>,
    desired_values: Vec<ValueRequirement>,
}

impl CalculationJobItem {
    /// Assemble a job item.
    pub fn new(
        function_unique_id: impl Into<String>,
        function_parameters: FunctionParameters,
        computation_target_specification: ComputationTargetSpecification,
        input_identifiers: Vec<i64>,
        desired_values: Vec<ValueRequirement>,
    ) -> Self {
        CalculationJobItem {
            function_unique_id: function_unique_id.into(),
            function_parameters,
            computation_target_specification,
            input_identifiers,
            desired_values,
        }
    }

    /// Job item invoking `node`.
    ///
    /// Inputs keep the node's order, desired values are the node's outputs.
    pub fn from_node(node: &DependencyNode, identifiers: &dyn IdentifierMap) -> Self {
        let function = node.function();

        CalculationJobItem::new(
            function.function_id(),
            function.parameters().clone(),
            node.target().clone(),
            identifiers.get_identifiers(node.input_values()),
            node.output_values()
                .iter()
                .map(|output| output.requirement_specification())
                .collect(),
        )
    }

    /// Unique id of the function to invoke.
    pub fn function_unique_id(&self) -> &str {
        &self.function_unique_id
    }

    /// Parameters of the function.
    pub fn function_parameters(&self) -> &FunctionParameters {
        &self.function_parameters
    }

    /// Target of the invocation.
    pub fn computation_target_specification(&self) -> &ComputationTargetSpecification {
        &self.computation_target_specification
    }

    /// Numeric identifiers of input values.
    pub fn input_identifiers(&self) -> &[i64] {
        &self.input_identifiers
    }

    /// Outputs the invocation should produce.
    pub fn desired_values(&self) -> &[ValueRequirement] {
        &self.desired_values
    }
}

impl WireCodec for CalculationJobItem {
    fn encode(&self, message: &mut WireMessage) {
        self.computation_target_specification.encode(message);
        message.add(
            FUNCTION_UNIQUE_ID,
            WireValue::String(self.function_unique_id.clone()),
        );
        message.add(
            FUNCTION_PARAMETERS,
            WireValue::Message(self.function_parameters.to_message()),
        );
        message.add(VALUE_INPUT, WireValue::LongArray(self.input_identifiers.clone()));
        for desired_value in &self.desired_values {
            message.add(DESIRED_VALUE, WireValue::Message(desired_value.to_message()));
        }
    }

    fn decode(message: &WireMessage) -> Result<Self, DecodeError> {
        let computation_target_specification = ComputationTargetSpecification::decode(message)
            .map_err(|e| match e {
                DecodeError::MissingField(_) => DecodeError::MissingField(TARGET_SPECIFICATION),
                e => e,
            })?;
        let function_unique_id = message.require_string(FUNCTION_UNIQUE_ID)?;
        let function_parameters =
            FunctionParameters::decode(message.require_message(FUNCTION_PARAMETERS)?)?;
        let input_identifiers = message.require_long_array(VALUE_INPUT)?.to_vec();
        let desired_values = message
            .messages(DESIRED_VALUE)?
            .into_iter()
            .map(ValueRequirement::decode)
            .collect::<Result<_, _>>()?;

        Ok(CalculationJobItem::new(
            function_unique_id,
            function_parameters,
            computation_target_specification,
            input_identifiers,
            desired_values,
        ))
    }
}
