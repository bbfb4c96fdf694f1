use crate::value::ValueSpecification;
use crate::wire::{DecodeError, WireCodec, WireMessage, WireValue};

const CALCULATION_CONFIGURATION_NAME: &str = "calculationConfigurationName";
const VALUE_SPECIFICATION: &str = "valueSpecification";

/// Request for values held in caches of a cycle.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ComputationCycleQuery {
    /// Configuration whose cache is queried.
    pub calculation_configuration_name: String,
    /// Values asked for.
    pub value_specifications: Vec<ValueSpecification>,
}

impl ComputationCycleQuery {
    /// Create a query.
    pub fn new(
        calculation_configuration_name: impl Into<String>,
        value_specifications: Vec<ValueSpecification>,
    ) -> Self {
        ComputationCycleQuery {
            calculation_configuration_name: calculation_configuration_name.into(),
            value_specifications,
        }
    }
}

impl WireCodec for ComputationCycleQuery {
    fn encode(&self, message: &mut WireMessage) {
        message.add(
            CALCULATION_CONFIGURATION_NAME,
            WireValue::String(self.calculation_configuration_name.clone()),
        );
        for specification in &self.value_specifications {
            message.add(
                VALUE_SPECIFICATION,
                WireValue::Message(specification.to_message()),
            );
        }
    }

    fn decode(message: &WireMessage) -> Result<Self, DecodeError> {
        let calculation_configuration_name =
            message.require_string(CALCULATION_CONFIGURATION_NAME)?;
        let value_specifications = message
            .messages(VALUE_SPECIFICATION)?
            .into_iter()
            .map(ValueSpecification::decode)
            .collect::<Result<_, _>>()?;

        Ok(ComputationCycleQuery::new(
            calculation_configuration_name,
            value_specifications,
        ))
    }
}
