//! Wire messages.
//!
//! Everything crossing the boundary between a cycle and a calculation node travels as a
//! [`WireMessage`]: an ordered list of optionally named, typed fields.
//! A field name may repeat, which is how lists are expressed.
//!
//! Types that travel implement [`WireCodec`].
//! Encoding appends fields to a message rather than producing a fresh one, so a type can be
//! flattened into the top level of its container by encoding it straight into the container's
//! message.
//!
//! Decoding is strict.
//! A field that is absent or has the wrong type fails the decode with a [`DecodeError`] naming
//! the field: defaults are never synthesized.

use serde::{Deserialize, Serialize};

use crate::value::Value;

mod builders;

/// Failure to decode an object out of a message.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Mandatory field is not present.
    #[error("message is missing mandatory field `{0}`")]
    MissingField(&'static str),

    /// Field is present, but its content is unusable.
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Bytes do not form a message at all.
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Value held by a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    /// UTF-8 string.
    String(String),
    /// 64-bit integer.
    Long(i64),
    /// Array of 64-bit integers.
    LongArray(Vec<i64>),
    /// Nested message.
    Message(WireMessage),
    /// Opaque structured payload.
    Json(Value),
}

impl WireValue {
    fn type_name(&self) -> &'static str {
        match self {
            WireValue::String(_) => "string",
            WireValue::Long(_) => "long",
            WireValue::LongArray(_) => "long array",
            WireValue::Message(_) => "message",
            WireValue::Json(_) => "json",
        }
    }
}

/// Single field of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireField {
    /// Name of the field, if any.
    pub name: Option<String>,
    /// Content of the field.
    pub value: WireValue,
}

/// Ordered collection of fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    fields: Vec<WireField>,
}

impl WireMessage {
    /// Create an empty message.
    pub fn new() -> Self {
        Default::default()
    }

    /// Append a named field.
    pub fn add(&mut self, name: impl Into<String>, value: WireValue) {
        self.fields.push(WireField {
            name: Some(name.into()),
            value,
        });
    }

    /// Append an unnamed field.
    pub fn add_unnamed(&mut self, value: WireValue) {
        self.fields.push(WireField { name: None, value });
    }

    /// All fields in order.
    pub fn fields(&self) -> &[WireField] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check whether the message has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First field named `name`.
    pub fn get(&self, name: &str) -> Option<&WireValue> {
        self.fields
            .iter()
            .find(|field| field.name.as_deref() == Some(name))
            .map(|field| &field.value)
    }

    /// Every field named `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a WireValue> + 'a {
        self.fields
            .iter()
            .filter(move |field| field.name.as_deref() == Some(name))
            .map(|field| &field.value)
    }

    /// Mandatory field named `name`.
    pub fn require(&self, name: &'static str) -> Result<&WireValue, DecodeError> {
        self.get(name).ok_or(DecodeError::MissingField(name))
    }

    /// Mandatory string field.
    pub fn require_string(&self, name: &'static str) -> Result<&str, DecodeError> {
        match self.require(name)? {
            WireValue::String(s) => Ok(s),
            other => Err(unexpected(name, "string", other)),
        }
    }

    /// Mandatory array-of-longs field.
    pub fn require_long_array(&self, name: &'static str) -> Result<&[i64], DecodeError> {
        match self.require(name)? {
            WireValue::LongArray(v) => Ok(v),
            other => Err(unexpected(name, "long array", other)),
        }
    }

    /// Mandatory nested message field.
    pub fn require_message(&self, name: &'static str) -> Result<&WireMessage, DecodeError> {
        match self.require(name)? {
            WireValue::Message(m) => Ok(m),
            other => Err(unexpected(name, "message", other)),
        }
    }

    /// Every field named `name`, each required to be a nested message.
    pub fn messages(&self, name: &'static str) -> Result<Vec<&WireMessage>, DecodeError> {
        self.get_all(name)
            .map(|value| match value {
                WireValue::Message(m) => Ok(m),
                other => Err(unexpected(name, "message", other)),
            })
            .collect()
    }

    /// Serialize into bytes.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))
    }
}

fn unexpected(field: &'static str, expected: &str, got: &WireValue) -> DecodeError {
    DecodeError::InvalidField {
        field,
        reason: format!("expected {}, got {}", expected, got.type_name()),
    }
}

/// Conversion between a type and wire messages.
pub trait WireCodec: Sized {
    /// Append fields representing `self` to `message`.
    fn encode(&self, message: &mut WireMessage);

    /// Reconstruct object from fields of `message`.
    fn decode(message: &WireMessage) -> Result<Self, DecodeError>;

    /// Encode into a fresh message.
    fn to_message(&self) -> WireMessage {
        let mut message = WireMessage::new();
        self.encode(&mut message);

        message
    }

    /// Encode and serialize into bytes.
    fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        self.to_message().to_bytes()
    }

    /// Deserialize and decode from bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::decode(&WireMessage::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_repeated_fields_keep_order() {
        let mut message = WireMessage::new();
        message.add("x", WireValue::Long(1));
        message.add_unnamed(WireValue::Long(2));
        message.add("x", WireValue::Long(3));

        let values: Vec<_> = message.get_all("x").cloned().collect();

        assert_eq!(values, vec![WireValue::Long(1), WireValue::Long(3)]);
        assert_eq!(message.len(), 3);
    }

    #[test]
    fn test_require_reports_field() {
        let mut message = WireMessage::new();
        message.add("x", WireValue::Long(1));

        assert_eq!(
            message.require_string("y").unwrap_err(),
            DecodeError::MissingField("y")
        );
        assert!(matches!(
            message.require_string("x").unwrap_err(),
            DecodeError::InvalidField { field: "x", .. }
        ));
    }

    #[test]
    fn test_bytes() {
        let mut message = WireMessage::new();
        message.add("ids", WireValue::LongArray(vec![1, 2, 3]));

        let bytes = message.to_bytes().unwrap();

        assert_eq!(WireMessage::from_bytes(&bytes).unwrap(), message);
        assert!(matches!(
            WireMessage::from_bytes(b"{not json"),
            Err(DecodeError::Malformed(_))
        ));
    }
}
