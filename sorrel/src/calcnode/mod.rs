//! Calculation nodes: the workers which actually invoke functions.
//!
//! A calculation node receives [`CalculationJobItem`]s, resolves their inputs out of a
//! computation cache, runs the function and hands back the values it produced.
//! Writing those values into the cache is left to the dispatcher, which knows which partition
//! each of them belongs to.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use tracing::debug;

use crate::cache::{ComputationCache, IdentifierMap};
use crate::function::{
    FunctionExecutionContext, FunctionInputs, InMemoryFunctionRepository, InvocationError,
};
use crate::value::ComputedValue;

mod job;

pub use job::CalculationJobItem;

/// Calculation node running in the current process.
pub struct LocalCalculationNode {
    functions: Arc<InMemoryFunctionRepository>,
    identifiers: Arc<dyn IdentifierMap>,
}

impl LocalCalculationNode {
    /// Create a node invoking functions out of `functions` and resolving input identifiers
    /// through `identifiers`.
    pub fn new(
        functions: Arc<InMemoryFunctionRepository>,
        identifiers: Arc<dyn IdentifierMap>,
    ) -> Self {
        LocalCalculationNode {
            functions,
            identifiers,
        }
    }

    /// Identifier map shared with dispatchers.
    pub fn identifiers(&self) -> &Arc<dyn IdentifierMap> {
        &self.identifiers
    }

    /// Run a single job item.
    pub fn execute(
        &self,
        item: &CalculationJobItem,
        cache: &dyn ComputationCache,
    ) -> Result<Vec<ComputedValue>, InvocationError> {
        let function_id = item.function_unique_id();
        let target = item.computation_target_specification();

        let invoker = self
            .functions
            .invoker(function_id)
            .ok_or_else(|| InvocationError::UnknownFunction(function_id.to_owned()))?;

        let kind = invoker.kind();
        if !kind.applies_to(target.target_type()) {
            return Err(InvocationError::TargetMismatch {
                function_id: function_id.to_owned(),
                kind,
                target_type: target.target_type(),
            });
        }

        let mut values = HashMap::with_capacity(item.input_identifiers().len());
        let mut missing = 0;
        for &identifier in item.input_identifiers() {
            let resolved = self
                .identifiers
                .get_value_specification(identifier)
                .and_then(|spec| cache.get_value(&spec).map(|value| (spec, value)));

            match resolved {
                Some((spec, value)) => {
                    values.insert(spec, value);
                }
                None => missing += 1,
            }
        }

        if missing > 0 {
            return Err(InvocationError::MissingInputs {
                function_id: function_id.to_owned(),
                missing,
            });
        }

        let inputs = FunctionInputs::new(values);
        let context = FunctionExecutionContext {
            function_id,
            target,
            parameters: item.function_parameters(),
            inputs: &inputs,
            desired_values: item.desired_values(),
        };

        debug!(function = function_id, %target, inputs = inputs.len(), "invoke function");

        invoker.execute(&context)
    }
}

impl Debug for LocalCalculationNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(LocalCalculationNode))
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{InMemoryComputationCache, InMemoryIdentifierMap};
    use crate::depgraph::test::{spec, target};
    use crate::function::{FunctionInvoker, FunctionKind, FunctionParameters};
    use crate::value::{ComputationTargetSpecification, UniqueId, Value, ValueRequirement};

    /// Doubles its single input.
    struct Double;

    impl FunctionInvoker for Double {
        fn kind(&self) -> FunctionKind {
            FunctionKind::Security
        }

        fn execute(
            &self,
            context: &FunctionExecutionContext<'_>,
        ) -> Result<Vec<ComputedValue>, InvocationError> {
            let input = context
                .inputs
                .value("Spot")
                .and_then(Value::as_i64)
                .ok_or_else(|| InvocationError::Failed("spot is not a number".to_owned()))?;

            Ok(context
                .desired_values
                .iter()
                .map(|req| ComputedValue::new(context.output_specification(req), Value::from(input * 2)))
                .collect())
        }
    }

    fn setup() -> (LocalCalculationNode, String) {
        let functions = Arc::new(InMemoryFunctionRepository::new());
        let id = functions
            .add_function("Double", FunctionKind::Security, Arc::new(Double))
            .unwrap()
            .unique_id()
            .to_owned();

        let node = LocalCalculationNode::new(functions, Arc::new(InMemoryIdentifierMap::new()));

        (node, id)
    }

    fn item(node: &LocalCalculationNode, function_id: &str, target: ComputationTargetSpecification) -> CalculationJobItem {
        CalculationJobItem::new(
            function_id,
            FunctionParameters::empty(),
            target.clone(),
            vec![node.identifiers().get_identifier(&spec("Spot", "A"))],
            vec![ValueRequirement::new("Forward", target)],
        )
    }

    #[test]
    fn test_execute() {
        let (node, id) = setup();
        let cache = InMemoryComputationCache::new();
        cache.put_shared_value(ComputedValue::new(spec("Spot", "A"), Value::from(21)));

        let values = node.execute(&item(&node, &id, target()), &cache).unwrap();

        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value(), &Value::from(42));
        assert_eq!(values[0].specification().function_id(), id);
    }

    #[test]
    fn test_missing_input() {
        let (node, id) = setup();
        let cache = InMemoryComputationCache::new();

        let r = node.execute(&item(&node, &id, target()), &cache);

        assert_eq!(
            r.unwrap_err(),
            InvocationError::MissingInputs {
                function_id: id,
                missing: 1
            }
        );
    }

    #[test]
    fn test_unknown_function() {
        let (node, _) = setup();
        let cache = InMemoryComputationCache::new();

        let r = node.execute(&item(&node, "404", target()), &cache);

        assert_eq!(r.unwrap_err(), InvocationError::UnknownFunction("404".to_owned()));
    }

    #[test]
    fn test_target_mismatch() {
        let (node, id) = setup();
        let cache = InMemoryComputationCache::new();
        let target = ComputationTargetSpecification::primitive(UniqueId::of("Ccy", "USD"));

        let r = node.execute(&item(&node, &id, target), &cache);

        assert!(matches!(r, Err(InvocationError::TargetMismatch { .. })));
    }
}
