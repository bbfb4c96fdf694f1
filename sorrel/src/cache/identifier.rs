//! Mapping between value specifications and numeric identifiers.
//!
//! Job items reference their inputs by number rather than by full specification,
//! the map is how both sides of the wire agree on the numbers.

use std::collections::HashMap;
use std::fmt::Debug;

use parking_lot::RwLock;

use crate::value::ValueSpecification;

/// Bidirectional `ValueSpecification <-> i64` map.
pub trait IdentifierMap: Debug + Send + Sync {
    /// Identifier of `specification`, allocating one on first use.
    fn get_identifier(&self, specification: &ValueSpecification) -> i64;

    /// Specification previously assigned `identifier`.
    fn get_value_specification(&self, identifier: i64) -> Option<ValueSpecification>;

    /// Identifiers of many specifications, in order.
    fn get_identifiers(&self, specifications: &[ValueSpecification]) -> Vec<i64> {
        specifications
            .iter()
            .map(|specification| self.get_identifier(specification))
            .collect()
    }
}

#[derive(Debug, Default)]
struct MapState {
    identifiers: HashMap<ValueSpecification, i64>,
    specifications: Vec<ValueSpecification>,
}

/// Identifier map assigning sequential identifiers starting from `1`.
///
/// Identifiers are never released or reused.
/// Once assigned, an identifier resolves to the same specification for as long as the map lives,
/// so job items encoded by any earlier cycle stay decodable.
/// The map grows with the number of distinct specifications it has seen: scope it to the
/// lifetime of the views it serves.
#[derive(Debug, Default)]
pub struct InMemoryIdentifierMap {
    state: RwLock<MapState>,
}

impl InMemoryIdentifierMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of identifiers assigned so far.
    pub fn len(&self) -> usize {
        self.state.read().specifications.len()
    }

    /// Check whether no identifier was assigned yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentifierMap for InMemoryIdentifierMap {
    fn get_identifier(&self, specification: &ValueSpecification) -> i64 {
        if let Some(&identifier) = self.state.read().identifiers.get(specification) {
            return identifier;
        }

        let mut guard = self.state.write();
        // Someone may have won the race between dropping read lock and taking write lock.
        if let Some(&identifier) = guard.identifiers.get(specification) {
            return identifier;
        }

        guard.specifications.push(specification.clone());
        let identifier = guard.specifications.len() as i64;
        guard.identifiers.insert(specification.clone(), identifier);

        identifier
    }

    fn get_value_specification(&self, identifier: i64) -> Option<ValueSpecification> {
        let index = usize::try_from(identifier).ok()?.checked_sub(1)?;

        self.state.read().specifications.get(index).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::{IdentifierMap, InMemoryIdentifierMap};
    use crate::depgraph::test::spec;

    #[test]
    fn test_sequential_and_stable() {
        let map = InMemoryIdentifierMap::new();

        assert_eq!(map.get_identifier(&spec("Spot", "A")), 1);
        assert_eq!(map.get_identifier(&spec("Forward", "B")), 2);
        assert_eq!(map.get_identifier(&spec("Spot", "A")), 1);
        assert_eq!(
            map.get_identifiers(&[spec("Forward", "B"), spec("Price", "C")]),
            vec![2, 3]
        );
    }

    #[test]
    fn test_identifiers_are_never_released() {
        let map = InMemoryIdentifierMap::new();
        assert!(map.is_empty());

        let spot = map.get_identifier(&spec("Spot", "A"));
        map.get_identifier(&spec("Forward", "B"));

        // Same specifications requested again, as by a later cycle.
        map.get_identifiers(&[spec("Spot", "A"), spec("Forward", "B")]);
        assert_eq!(map.len(), 2);

        map.get_identifier(&spec("Price", "C"));
        assert_eq!(map.len(), 3);
        assert_eq!(map.get_value_specification(spot), Some(spec("Spot", "A")));
    }

    #[test]
    fn test_reverse_lookup() {
        let map = InMemoryIdentifierMap::new();
        map.get_identifier(&spec("Spot", "A"));

        assert_eq!(map.get_value_specification(1), Some(spec("Spot", "A")));
        assert_eq!(map.get_value_specification(0), None);
        assert_eq!(map.get_value_specification(-4), None);
        assert_eq!(map.get_value_specification(2), None);
    }
}
