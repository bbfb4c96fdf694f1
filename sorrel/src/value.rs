//! Keys identifying *what* was computed, *for what* and *by whom*.
//!
//! Everything in this module is an immutable leaf data type.
//! Equality and hashing are structural, which makes [`ValueSpecification`] usable both as a cache
//! key and as the identity of an edge in a dependency graph.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Opaque payload of a computed value.
///
/// The engine never looks inside values: it only moves them between caches and compares them
/// for equality when computing deltas between cycles.
pub type Value = serde_json::Value;

/// Identifier of an entity within some identification scheme.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct UniqueId {
    scheme: String,
    value: String,
    version: Option<String>,
}

impl UniqueId {
    /// Create an unversioned identifier.
    pub fn of(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        UniqueId {
            scheme: scheme.into(),
            value: value.into(),
            version: None,
        }
    }

    /// Create a versioned identifier.
    pub fn versioned(
        scheme: impl Into<String>,
        value: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        UniqueId {
            scheme: scheme.into(),
            value: value.into(),
            version: Some(version.into()),
        }
    }

    /// Identification scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Value within the scheme.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Version, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl Display for UniqueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}~{}", self.scheme, self.value)?;
        if let Some(version) = &self.version {
            write!(f, "~{}", version)?;
        }

        Ok(())
    }
}

/// Kind of entity a value is computed for.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputationTargetType {
    /// A node of a portfolio tree, aggregating positions beneath it.
    PortfolioNode,
    /// A single position.
    Position,
    /// A security.
    Security,
    /// Anything addressable purely by its identifier (a currency, a curve name...).
    Primitive,
}

impl ComputationTargetType {
    /// All target types in declaration order.
    pub const ALL: [ComputationTargetType; 4] = [
        ComputationTargetType::PortfolioNode,
        ComputationTargetType::Position,
        ComputationTargetType::Security,
        ComputationTargetType::Primitive,
    ];

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        use ComputationTargetType::*;

        match self {
            PortfolioNode => "PORTFOLIO_NODE",
            Position => "POSITION",
            Security => "SECURITY",
            Primitive => "PRIMITIVE",
        }
    }

    /// Parse canonical name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

impl Display for ComputationTargetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies the target a value is computed for.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ComputationTargetSpecification {
    target_type: ComputationTargetType,
    identifier: UniqueId,
}

impl ComputationTargetSpecification {
    /// Create a new specification.
    pub fn new(target_type: ComputationTargetType, identifier: UniqueId) -> Self {
        ComputationTargetSpecification {
            target_type,
            identifier,
        }
    }

    /// Shortcut for a primitive target.
    pub fn primitive(identifier: UniqueId) -> Self {
        Self::new(ComputationTargetType::Primitive, identifier)
    }

    /// Shortcut for a security target.
    pub fn security(identifier: UniqueId) -> Self {
        Self::new(ComputationTargetType::Security, identifier)
    }

    /// Shortcut for a position target.
    pub fn position(identifier: UniqueId) -> Self {
        Self::new(ComputationTargetType::Position, identifier)
    }

    /// Shortcut for a portfolio node target.
    pub fn portfolio_node(identifier: UniqueId) -> Self {
        Self::new(ComputationTargetType::PortfolioNode, identifier)
    }

    /// Kind of the target.
    pub fn target_type(&self) -> ComputationTargetType {
        self.target_type
    }

    /// Identifier of the target.
    pub fn identifier(&self) -> &UniqueId {
        &self.identifier
    }
}

impl Display for ComputationTargetSpecification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CTSpec[{}, {}]", self.target_type, self.identifier)
    }
}

/// Named properties qualifying a value, each holding a set of permitted values.
///
/// An empty set under a name means "any value".
#[derive(Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ValueProperties(BTreeMap<String, BTreeSet<String>>);

impl ValueProperties {
    /// Properties with nothing set.
    pub fn none() -> Self {
        Default::default()
    }

    /// Add a value under property `name`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.entry(name.into()).or_default().insert(value.into());
        self
    }

    /// Declare property `name` without restricting its value.
    pub fn with_any(mut self, name: impl Into<String>) -> Self {
        self.0.entry(name.into()).or_default();
        self
    }

    /// Check whether no property is declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Values declared under `name`.
    pub fn values(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.0.get(name)
    }

    /// Iterate over declared properties in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.0.iter().map(|(name, values)| (name.as_str(), values))
    }
}

impl Display for ValueProperties {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (name, values)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}=[", name)?;
            for (j, value) in values.iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                f.write_str(value)?;
            }
            f.write_str("]")?;
        }
        f.write_str("}")
    }
}

/// A request for a value: name, target and constraints the producer must satisfy.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ValueRequirement {
    value_name: String,
    target_specification: ComputationTargetSpecification,
    constraints: ValueProperties,
}

impl ValueRequirement {
    /// Create an unconstrained requirement.
    pub fn new(
        value_name: impl Into<String>,
        target_specification: ComputationTargetSpecification,
    ) -> Self {
        Self::with_constraints(value_name, target_specification, ValueProperties::none())
    }

    /// Create a requirement with constraints.
    pub fn with_constraints(
        value_name: impl Into<String>,
        target_specification: ComputationTargetSpecification,
        constraints: ValueProperties,
    ) -> Self {
        ValueRequirement {
            value_name: value_name.into(),
            target_specification,
            constraints,
        }
    }

    /// Name of the value.
    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    /// Target the value is required for.
    pub fn target_specification(&self) -> &ComputationTargetSpecification {
        &self.target_specification
    }

    /// Constraints imposed on the producer.
    pub fn constraints(&self) -> &ValueProperties {
        &self.constraints
    }
}

impl Display for ValueRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ValueReq[{}, {}, {}]",
            self.value_name, self.target_specification, self.constraints
        )
    }
}

/// Unique key of a computed value: what, for what target, by which function, under which
/// properties.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ValueSpecification {
    value_name: String,
    target_specification: ComputationTargetSpecification,
    function_id: String,
    properties: ValueProperties,
}

impl ValueSpecification {
    /// Create a new specification.
    pub fn new(
        value_name: impl Into<String>,
        target_specification: ComputationTargetSpecification,
        function_id: impl Into<String>,
        properties: ValueProperties,
    ) -> Self {
        ValueSpecification {
            value_name: value_name.into(),
            target_specification,
            function_id: function_id.into(),
            properties,
        }
    }

    /// Name of the value.
    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    /// Target the value is computed for.
    pub fn target_specification(&self) -> &ComputationTargetSpecification {
        &self.target_specification
    }

    /// Unique id of the producing function.
    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    /// Properties of the produced value.
    pub fn properties(&self) -> &ValueProperties {
        &self.properties
    }

    /// Requirement this specification satisfies exactly.
    ///
    /// This is the form used to ask live data providers for market values.
    pub fn requirement_specification(&self) -> ValueRequirement {
        ValueRequirement::with_constraints(
            self.value_name.clone(),
            self.target_specification.clone(),
            self.properties.clone(),
        )
    }
}

impl Display for ValueSpecification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VSpec[{}, {}, {}, {}]",
            self.value_name, self.target_specification, self.function_id, self.properties
        )
    }
}

/// A value together with the specification it was computed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedValue {
    specification: ValueSpecification,
    value: Value,
}

impl ComputedValue {
    /// Pair a value with its specification.
    pub fn new(specification: ValueSpecification, value: Value) -> Self {
        ComputedValue {
            specification,
            value,
        }
    }

    /// Specification of the value.
    pub fn specification(&self) -> &ValueSpecification {
        &self.specification
    }

    /// The value itself.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Split into parts.
    pub fn into_parts(self) -> (ValueSpecification, Value) {
        (self.specification, self.value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn spec(name: &str) -> ValueSpecification {
        ValueSpecification::new(
            name,
            ComputationTargetSpecification::primitive(UniqueId::of("Scheme", "USD")),
            "FN1",
            ValueProperties::none().with("Currency", "USD"),
        )
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(spec("Value"), spec("Value"));
        assert_ne!(spec("Value"), spec("OtherValue"));
    }

    #[test]
    fn test_requirement_specification() {
        let requirement = spec("Value").requirement_specification();

        assert_eq!(requirement.value_name(), "Value");
        assert_eq!(
            requirement.target_specification().target_type(),
            ComputationTargetType::Primitive
        );
        assert_eq!(
            requirement.constraints().values("Currency").map(|v| v.len()),
            Some(1)
        );
    }

    #[test]
    fn test_target_type_names() {
        for target_type in ComputationTargetType::ALL.iter().copied() {
            assert_eq!(
                ComputationTargetType::from_name(target_type.name()),
                Some(target_type)
            );
        }

        assert_eq!(ComputationTargetType::from_name("TRADE"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(UniqueId::versioned("A", "B", "1").to_string(), "A~B~1");
        assert_eq!(
            ValueProperties::none()
                .with("X", "2")
                .with("X", "1")
                .with_any("Y")
                .to_string(),
            "{X=[1, 2], Y=[]}"
        );
    }
}
