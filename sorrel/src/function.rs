//! Functions: what a dependency node invokes to produce its outputs.
//!
//! Every function carries a [`FunctionKind`] tag.
//! The tag is a closed set: deciding whether a node needs invocation at all, or which targets
//! a function is applicable to, is a single `match` over it rather than probing concrete types.

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::value::{
    ComputationTargetSpecification, ComputationTargetType, ComputedValue, Value,
    ValueRequirement, ValueSpecification,
};

/// Kind of a function.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Pass-through exposing already available live data.
    ///
    /// Such functions never compute anything: their outputs are written into caches directly
    /// when a cycle prepares its inputs.
    LiveDataSourcing,
    /// Applicable to any target.
    Primitive,
    /// Applicable to securities, and to positions through their security.
    Security,
    /// Applicable to positions.
    Position,
    /// Applicable to portfolio nodes, aggregating positions beneath them.
    AggregatePosition,
}

impl FunctionKind {
    /// Check whether nodes of this kind must be handed to an executor.
    pub fn requires_invocation(self) -> bool {
        match self {
            FunctionKind::LiveDataSourcing => false,
            FunctionKind::Primitive
            | FunctionKind::Security
            | FunctionKind::Position
            | FunctionKind::AggregatePosition => true,
        }
    }

    /// Check whether a function of this kind can be applied to a target of given type.
    pub fn applies_to(self, target_type: ComputationTargetType) -> bool {
        use ComputationTargetType as T;
        use FunctionKind::*;

        match (self, target_type) {
            (LiveDataSourcing, _) => true,
            (Primitive, _) => true,
            (Security, T::Security) | (Security, T::Position) => true,
            (Position, T::Position) => true,
            (AggregatePosition, T::PortfolioNode) => true,
            (Security, _) | (Position, _) | (AggregatePosition, _) => false,
        }
    }
}

/// Opaque, function-specific configuration.
///
/// Parameters are tagged with a type name so a receiving calculation node can tell what it got
/// without knowing the function in advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameters {
    type_name: String,
    payload: Value,
}

impl FunctionParameters {
    /// Type name used by [`empty`](Self::empty) parameters.
    pub const EMPTY_TYPE_NAME: &'static str = "EmptyFunctionParameters";

    /// Create tagged parameters.
    pub fn new(type_name: impl Into<String>, payload: Value) -> Self {
        FunctionParameters {
            type_name: type_name.into(),
            payload,
        }
    }

    /// Parameters of a function which takes none.
    pub fn empty() -> Self {
        Self::new(Self::EMPTY_TYPE_NAME, Value::Null)
    }

    /// Type tag.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Parameter payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

impl Default for FunctionParameters {
    fn default() -> Self {
        Self::empty()
    }
}

// JSON values cannot hold NaN, so equality is total.
impl Eq for FunctionParameters {}

impl Hash for FunctionParameters {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
        // Objects are kept sorted by key, so the rendering is canonical.
        self.payload.to_string().hash(state);
    }
}

/// A function bound to its parameters, as referenced by a dependency node.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ParameterizedFunction {
    function_id: String,
    kind: FunctionKind,
    parameters: FunctionParameters,
}

impl ParameterizedFunction {
    /// Bind function to parameters.
    pub fn new(
        function_id: impl Into<String>,
        kind: FunctionKind,
        parameters: FunctionParameters,
    ) -> Self {
        ParameterizedFunction {
            function_id: function_id.into(),
            kind,
            parameters,
        }
    }

    /// Unique id of the function.
    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    /// Kind of the function.
    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// Bound parameters.
    pub fn parameters(&self) -> &FunctionParameters {
        &self.parameters
    }
}

/// Metadata of a registered function.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct FunctionDefinition {
    unique_id: String,
    short_name: String,
    kind: FunctionKind,
}

impl FunctionDefinition {
    /// Unique id assigned by the repository.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Human-readable name.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Kind of the function.
    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// Bind definition to parameters.
    pub fn parameterized(&self, parameters: FunctionParameters) -> ParameterizedFunction {
        ParameterizedFunction::new(self.unique_id.clone(), self.kind, parameters)
    }
}

/// Input values resolved for one invocation.
#[derive(Debug, Clone, Default)]
pub struct FunctionInputs {
    values: HashMap<ValueSpecification, Value>,
}

impl FunctionInputs {
    /// Collect resolved inputs.
    pub fn new(values: HashMap<ValueSpecification, Value>) -> Self {
        FunctionInputs { values }
    }

    /// Value under exact specification.
    pub fn get(&self, specification: &ValueSpecification) -> Option<&Value> {
        self.values.get(specification)
    }

    /// First value with given value name.
    pub fn value(&self, value_name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(spec, _)| spec.value_name() == value_name)
            .map(|(_, value)| value)
    }

    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check whether there are no inputs.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Everything a function gets to see about its invocation.
#[derive(Debug, Clone)]
pub struct FunctionExecutionContext<'a> {
    /// Unique id of the invoked function.
    pub function_id: &'a str,
    /// Target of the invocation.
    pub target: &'a ComputationTargetSpecification,
    /// Parameters bound to the function.
    pub parameters: &'a FunctionParameters,
    /// Resolved inputs.
    pub inputs: &'a FunctionInputs,
    /// Outputs the invocation is expected to produce.
    pub desired_values: &'a [ValueRequirement],
}

impl<'a> FunctionExecutionContext<'a> {
    /// Specification under which a value satisfying `requirement` should be reported.
    pub fn output_specification(&self, requirement: &ValueRequirement) -> ValueSpecification {
        ValueSpecification::new(
            requirement.value_name(),
            requirement.target_specification().clone(),
            self.function_id,
            requirement.constraints().clone(),
        )
    }
}

/// Errors produced when a single function invocation fails.
///
/// These are node-level failures: the node is recorded as failed and the cycle carries on.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum InvocationError {
    /// Function is not registered on the calculation node.
    #[error("no invoker registered for function `{0}`")]
    UnknownFunction(String),

    /// Function cannot be applied to the target.
    #[error("function `{function_id}` of kind {kind:?} cannot be applied to {target_type} target")]
    TargetMismatch {
        /// Unique id of the function.
        function_id: String,
        /// Kind of the function.
        kind: FunctionKind,
        /// Type of the offending target.
        target_type: ComputationTargetType,
    },

    /// Some inputs are not present in the cache.
    #[error("function `{function_id}` is missing {missing} input(s)")]
    MissingInputs {
        /// Unique id of the function.
        function_id: String,
        /// Number of absent inputs.
        missing: usize,
    },

    /// Function itself reported failure.
    #[error("function failed: {0}")]
    Failed(String),
}

/// Executable body of a function.
pub trait FunctionInvoker: Send + Sync + 'static {
    /// Kind of functions this invoker implements.
    fn kind(&self) -> FunctionKind;

    /// Compute outputs.
    fn execute(
        &self,
        context: &FunctionExecutionContext<'_>,
    ) -> Result<Vec<ComputedValue>, InvocationError>;
}

/// Rejected function registration.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RegistrationError {
    /// Live data sourcing functions are never invoked.
    #[error("live data sourcing functions cannot have an invoker")]
    LiveDataSourcingInvoker,

    /// Invoker implements a different kind of function.
    #[error("invoker of kind {invoker:?} cannot implement definition of kind {definition:?}")]
    KindMismatch {
        /// Kind of the definition.
        definition: FunctionKind,
        /// Kind of the invoker.
        invoker: FunctionKind,
    },
}

#[derive(Default)]
struct RepositoryState {
    functions: Vec<FunctionDefinition>,
    invokers: HashMap<String, Arc<dyn FunctionInvoker>>,
}

/// Function repository held in memory.
///
/// Unique ids are assigned sequentially on registration, starting from `"1"`.
#[derive(Default)]
pub struct InMemoryFunctionRepository {
    state: RwLock<RepositoryState>,
}

impl InMemoryFunctionRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a function which needs invocation.
    pub fn add_function(
        &self,
        short_name: impl Into<String>,
        kind: FunctionKind,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Result<FunctionDefinition, RegistrationError> {
        if !kind.requires_invocation() {
            return Err(RegistrationError::LiveDataSourcingInvoker);
        }
        if invoker.kind() != kind {
            return Err(RegistrationError::KindMismatch {
                definition: kind,
                invoker: invoker.kind(),
            });
        }

        let mut guard = self.state.write();
        let definition = Self::register(&mut guard, short_name.into(), kind);
        guard
            .invokers
            .insert(definition.unique_id.clone(), invoker);

        Ok(definition)
    }

    /// Register a live data sourcing pass-through.
    pub fn add_live_data_sourcing_function(
        &self,
        short_name: impl Into<String>,
    ) -> FunctionDefinition {
        let mut guard = self.state.write();
        Self::register(&mut guard, short_name.into(), FunctionKind::LiveDataSourcing)
    }

    fn register(
        state: &mut RepositoryState,
        short_name: String,
        kind: FunctionKind,
    ) -> FunctionDefinition {
        let definition = FunctionDefinition {
            unique_id: (state.functions.len() + 1).to_string(),
            short_name,
            kind,
        };
        state.functions.push(definition.clone());

        definition
    }

    /// All registered functions in registration order.
    pub fn all_functions(&self) -> Vec<FunctionDefinition> {
        self.state.read().functions.clone()
    }

    /// Look up invoker by function unique id.
    pub fn invoker(&self, unique_id: &str) -> Option<Arc<dyn FunctionInvoker>> {
        self.state.read().invokers.get(unique_id).cloned()
    }
}

impl Debug for InMemoryFunctionRepository {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let guard = self.state.read();

        f.debug_struct(stringify!(InMemoryFunctionRepository))
            .field("functions", &guard.functions)
            .finish_non_exhaustive()
    }
}

impl Display for FunctionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}
