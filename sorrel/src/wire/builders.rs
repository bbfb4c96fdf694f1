//! Codecs of value model types.

use super::{DecodeError, WireCodec, WireMessage, WireValue};
use crate::function::FunctionParameters;
use crate::value::{
    ComputationTargetSpecification, ComputationTargetType, UniqueId, ValueProperties,
    ValueRequirement, ValueSpecification,
};

const SCHEME: &str = "scheme";
const VALUE: &str = "value";
const VERSION: &str = "version";
const TARGET_TYPE: &str = "computationTargetType";
const TARGET_ID: &str = "computationTargetId";
const VALUE_NAME: &str = "valueName";
const FUNCTION_ID: &str = "functionUniqueId";
const PROPERTIES: &str = "properties";
const CONSTRAINTS: &str = "constraints";
const PARAMETERS_TYPE: &str = "type";
const PARAMETERS_PAYLOAD: &str = "payload";

impl WireCodec for UniqueId {
    fn encode(&self, message: &mut WireMessage) {
        message.add(SCHEME, WireValue::String(self.scheme().to_owned()));
        message.add(VALUE, WireValue::String(self.value().to_owned()));
        if let Some(version) = self.version() {
            message.add(VERSION, WireValue::String(version.to_owned()));
        }
    }

    fn decode(message: &WireMessage) -> Result<Self, DecodeError> {
        let scheme = message.require_string(SCHEME)?;
        let value = message.require_string(VALUE)?;

        let id = match message.get(VERSION) {
            None => UniqueId::of(scheme, value),
            Some(_) => UniqueId::versioned(scheme, value, message.require_string(VERSION)?),
        };

        Ok(id)
    }
}

impl WireCodec for ComputationTargetSpecification {
    fn encode(&self, message: &mut WireMessage) {
        message.add(
            TARGET_TYPE,
            WireValue::String(self.target_type().name().to_owned()),
        );
        message.add(TARGET_ID, WireValue::Message(self.identifier().to_message()));
    }

    fn decode(message: &WireMessage) -> Result<Self, DecodeError> {
        let name = message.require_string(TARGET_TYPE)?;
        let target_type =
            ComputationTargetType::from_name(name).ok_or_else(|| DecodeError::InvalidField {
                field: TARGET_TYPE,
                reason: format!("unknown target type `{}`", name),
            })?;
        let identifier = UniqueId::decode(message.require_message(TARGET_ID)?)?;

        Ok(ComputationTargetSpecification::new(target_type, identifier))
    }
}

impl WireCodec for ValueProperties {
    fn encode(&self, message: &mut WireMessage) {
        for (name, values) in self.iter() {
            let mut inner = WireMessage::new();
            for value in values {
                inner.add_unnamed(WireValue::String(value.clone()));
            }
            message.add(name, WireValue::Message(inner));
        }
    }

    fn decode(message: &WireMessage) -> Result<Self, DecodeError> {
        message
            .fields()
            .iter()
            .try_fold(ValueProperties::none(), |properties, field| {
                let (name, inner) = match (&field.name, &field.value) {
                    (Some(name), WireValue::Message(inner)) => (name, inner),
                    _ => {
                        return Err(DecodeError::InvalidField {
                            field: PROPERTIES,
                            reason: "expected named message per property".to_owned(),
                        })
                    }
                };

                let properties = properties.with_any(name.clone());

                inner
                    .fields()
                    .iter()
                    .try_fold(properties, |properties, field| match &field.value {
                        WireValue::String(value) => Ok(properties.with(name.clone(), value.clone())),
                        _ => Err(DecodeError::InvalidField {
                            field: PROPERTIES,
                            reason: format!("property `{}` holds a non-string value", name),
                        }),
                    })
            })
    }
}

impl WireCodec for ValueRequirement {
    fn encode(&self, message: &mut WireMessage) {
        message.add(VALUE_NAME, WireValue::String(self.value_name().to_owned()));
        self.target_specification().encode(message);
        message.add(CONSTRAINTS, WireValue::Message(self.constraints().to_message()));
    }

    fn decode(message: &WireMessage) -> Result<Self, DecodeError> {
        Ok(ValueRequirement::with_constraints(
            message.require_string(VALUE_NAME)?,
            ComputationTargetSpecification::decode(message)?,
            ValueProperties::decode(message.require_message(CONSTRAINTS)?)?,
        ))
    }
}

impl WireCodec for ValueSpecification {
    fn encode(&self, message: &mut WireMessage) {
        message.add(VALUE_NAME, WireValue::String(self.value_name().to_owned()));
        self.target_specification().encode(message);
        message.add(FUNCTION_ID, WireValue::String(self.function_id().to_owned()));
        message.add(PROPERTIES, WireValue::Message(self.properties().to_message()));
    }

    fn decode(message: &WireMessage) -> Result<Self, DecodeError> {
        Ok(ValueSpecification::new(
            message.require_string(VALUE_NAME)?,
            ComputationTargetSpecification::decode(message)?,
            message.require_string(FUNCTION_ID)?,
            ValueProperties::decode(message.require_message(PROPERTIES)?)?,
        ))
    }
}

impl WireCodec for FunctionParameters {
    fn encode(&self, message: &mut WireMessage) {
        message.add(
            PARAMETERS_TYPE,
            WireValue::String(self.type_name().to_owned()),
        );
        message.add(PARAMETERS_PAYLOAD, WireValue::Json(self.payload().clone()));
    }

    fn decode(message: &WireMessage) -> Result<Self, DecodeError> {
        let type_name = message.require_string(PARAMETERS_TYPE)?;
        let payload = match message.require(PARAMETERS_PAYLOAD)? {
            WireValue::Json(payload) => payload.clone(),
            _ => {
                return Err(DecodeError::InvalidField {
                    field: PARAMETERS_PAYLOAD,
                    reason: "expected json".to_owned(),
                })
            }
        };

        Ok(FunctionParameters::new(type_name, payload))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::depgraph::test::target;

    #[test]
    fn test_target_is_flat() {
        let message = target().to_message();

        assert_eq!(message.len(), 2);
        assert_eq!(message.require_string(TARGET_TYPE).unwrap(), "SECURITY");
        assert_eq!(ComputationTargetSpecification::decode(&message).unwrap(), target());
    }

    #[test]
    fn test_unknown_target_type() {
        let mut message = WireMessage::new();
        message.add(TARGET_TYPE, WireValue::String("TRADE".to_owned()));
        message.add(
            TARGET_ID,
            WireValue::Message(UniqueId::of("A", "B").to_message()),
        );

        assert!(matches!(
            ComputationTargetSpecification::decode(&message),
            Err(DecodeError::InvalidField {
                field: TARGET_TYPE,
                ..
            })
        ));
    }

    #[test]
    fn test_specification_keeps_properties() {
        let spec = ValueSpecification::new(
            "Price",
            target(),
            "7",
            ValueProperties::none()
                .with("Currency", "USD")
                .with("Currency", "EUR")
                .with_any("Curve"),
        );

        assert_eq!(ValueSpecification::decode(&spec.to_message()).unwrap(), spec);
    }

    #[test]
    fn test_versioned_id() {
        let id = UniqueId::versioned("Ticker", "AAPL", "3");

        assert_eq!(UniqueId::decode(&id.to_message()).unwrap(), id);
    }
}
