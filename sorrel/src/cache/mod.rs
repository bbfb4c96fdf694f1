//! Computation caches.
//!
//! A cache holds computed values of one calculation configuration at one valuation time.
//! Every cache is split into two partitions:
//!
//! *   **shared** values are visible to every configuration of the same view at the same
//!     valuation time.
//!     Only live data lands here.
//! *   **private** values are only visible to the configuration which produced them.
//!     Every computed value lands here, terminal outputs included.
//!
//! Reads look into the private partition first and fall back to the shared one.
//!
//! Caches are handed out by a [`ComputationCacheSource`] and are written concurrently by
//! executor workers, so every implementation must accept puts from many threads at once.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use crate::depgraph::DependencyGraph;
use crate::time::ValuationTime;
use crate::value::{ComputedValue, Value, ValueSpecification};

mod identifier;
mod memory;

pub use identifier::{IdentifierMap, InMemoryIdentifierMap};
pub use memory::{InMemoryComputationCache, InMemoryComputationCacheSource};

/// Hint telling which partition a value lives in.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CacheSelectHint {
    /// Every value is shared.
    AllShared,
    /// Every value is private.
    AllPrivate,
    /// Listed values are private, the rest are shared.
    PrivateValues(HashSet<ValueSpecification>),
}

impl CacheSelectHint {
    /// Hint matching how executors store outputs of `graph`.
    ///
    /// Outputs of live data sourcing nodes are shared, everything else is private.
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let private = graph
            .nodes()
            .iter()
            .filter(|node| !node.is_live_data_sourcing())
            .flat_map(|node| node.output_values())
            .cloned()
            .collect();

        CacheSelectHint::PrivateValues(private)
    }

    /// Check whether `specification` belongs to private partition.
    pub fn is_private(&self, specification: &ValueSpecification) -> bool {
        match self {
            CacheSelectHint::AllShared => false,
            CacheSelectHint::AllPrivate => true,
            CacheSelectHint::PrivateValues(private) => private.contains(specification),
        }
    }
}

/// Key/value store of computed values for one configuration at one valuation time.
pub trait ComputationCache: Debug + Send + Sync {
    /// Look up a value, private partition first.
    fn get_value(&self, specification: &ValueSpecification) -> Option<Value>;

    /// Look up many values, consulting only the partition `hint` points at.
    ///
    /// Results come in the same order as `specifications`.
    fn get_values(
        &self,
        specifications: &[ValueSpecification],
        hint: &CacheSelectHint,
    ) -> Vec<(ValueSpecification, Option<Value>)>;

    /// Store a value visible to all configurations.
    fn put_shared_value(&self, value: ComputedValue);

    /// Store a value visible to this configuration only.
    fn put_private_value(&self, value: ComputedValue);

    /// Store many values, routing each into the partition `hint` points at.
    fn put_values(&self, values: Vec<ComputedValue>, hint: &CacheSelectHint) {
        for value in values {
            if hint.is_private(value.specification()) {
                self.put_private_value(value);
            } else {
                self.put_shared_value(value);
            }
        }
    }

    /// Every value visible through this cache.
    ///
    /// Private values shadow shared values under the same specification.
    fn entries(&self) -> Vec<(ValueSpecification, Value)>;
}

/// Provider of computation caches.
pub trait ComputationCacheSource: Debug + Send + Sync {
    /// Get (creating if necessary) cache of a configuration.
    fn get_cache(
        &self,
        view_name: &str,
        calculation_configuration_name: &str,
        valuation_time: ValuationTime,
    ) -> Arc<dyn ComputationCache>;

    /// Release every cache of the view at valuation time.
    fn release_caches(&self, view_name: &str, valuation_time: ValuationTime);
}

#[cfg(test)]
mod test {
    use super::CacheSelectHint;
    use crate::depgraph::test::{chain, spec};

    #[test]
    fn test_hint_from_graph() {
        let hint = CacheSelectHint::from_graph(&chain());

        // Live data.
        assert!(!hint.is_private(&spec("Spot", "A")));
        // Intermediate.
        assert!(hint.is_private(&spec("Forward", "B")));
        // Terminal.
        assert!(hint.is_private(&spec("Price", "C")));
    }

    #[test]
    fn test_hint_blanket() {
        assert!(CacheSelectHint::AllPrivate.is_private(&spec("Spot", "A")));
        assert!(!CacheSelectHint::AllShared.is_private(&spec("Spot", "A")));
    }
}
