//! Caches held in process memory.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{CacheSelectHint, ComputationCache, ComputationCacheSource};
use crate::time::ValuationTime;
use crate::value::{ComputedValue, Value, ValueSpecification};

/// One cache partition.
#[derive(Default)]
struct ValueStore(RwLock<HashMap<ValueSpecification, Value>>);

impl ValueStore {
    fn get(&self, specification: &ValueSpecification) -> Option<Value> {
        self.0.read().get(specification).cloned()
    }

    fn put(&self, value: ComputedValue) {
        let (specification, value) = value.into_parts();
        self.0.write().insert(specification, value);
    }

    fn len(&self) -> usize {
        self.0.read().len()
    }
}

impl Debug for ValueStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[..; {}]", self.len())
    }
}

/// Computation cache backed by two hash maps.
#[derive(Debug)]
pub struct InMemoryComputationCache {
    shared: Arc<ValueStore>,
    private: ValueStore,
}

impl InMemoryComputationCache {
    /// Create a standalone cache not sharing values with anyone.
    pub fn new() -> Self {
        Self::with_shared(Default::default())
    }

    fn with_shared(shared: Arc<ValueStore>) -> Self {
        InMemoryComputationCache {
            shared,
            private: Default::default(),
        }
    }
}

impl Default for InMemoryComputationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputationCache for InMemoryComputationCache {
    fn get_value(&self, specification: &ValueSpecification) -> Option<Value> {
        self.private
            .get(specification)
            .or_else(|| self.shared.get(specification))
    }

    fn get_values(
        &self,
        specifications: &[ValueSpecification],
        hint: &CacheSelectHint,
    ) -> Vec<(ValueSpecification, Option<Value>)> {
        let private = self.private.0.read();
        let shared = self.shared.0.read();

        specifications
            .iter()
            .map(|specification| {
                let store = if hint.is_private(specification) {
                    &private
                } else {
                    &shared
                };

                (specification.clone(), store.get(specification).cloned())
            })
            .collect()
    }

    fn put_shared_value(&self, value: ComputedValue) {
        self.shared.put(value)
    }

    fn put_private_value(&self, value: ComputedValue) {
        self.private.put(value)
    }

    fn entries(&self) -> Vec<(ValueSpecification, Value)> {
        let mut entries = self.shared.0.read().clone();
        entries.extend(
            self.private
                .0
                .read()
                .iter()
                .map(|(spec, value)| (spec.clone(), value.clone())),
        );

        entries.into_iter().collect()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct SharedKey {
    view_name: String,
    valuation_time: ValuationTime,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct CacheKey {
    shared: SharedKey,
    calculation_configuration_name: String,
}

#[derive(Debug, Default)]
struct SourceState {
    shared: HashMap<SharedKey, Arc<ValueStore>>,
    caches: HashMap<CacheKey, Arc<InMemoryComputationCache>>,
}

/// Cache source handing out [`InMemoryComputationCache`]s.
///
/// Caches of the same view and valuation time share their shared partition.
#[derive(Debug, Default)]
pub struct InMemoryComputationCacheSource {
    state: Mutex<SourceState>,
}

impl InMemoryComputationCacheSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of caches currently alive.
    pub fn cache_count(&self) -> usize {
        self.state.lock().caches.len()
    }
}

impl ComputationCacheSource for InMemoryComputationCacheSource {
    fn get_cache(
        &self,
        view_name: &str,
        calculation_configuration_name: &str,
        valuation_time: ValuationTime,
    ) -> Arc<dyn ComputationCache> {
        let shared_key = SharedKey {
            view_name: view_name.to_owned(),
            valuation_time,
        };
        let key = CacheKey {
            shared: shared_key.clone(),
            calculation_configuration_name: calculation_configuration_name.to_owned(),
        };

        let mut guard = self.state.lock();
        if let Some(cache) = guard.caches.get(&key) {
            return cache.clone();
        }

        let shared = guard.shared.entry(shared_key).or_default().clone();
        let cache = Arc::new(InMemoryComputationCache::with_shared(shared));
        guard.caches.insert(key, cache.clone());

        cache
    }

    fn release_caches(&self, view_name: &str, valuation_time: ValuationTime) {
        let released = |key: &SharedKey| {
            key.view_name == view_name && key.valuation_time == valuation_time
        };

        let mut guard = self.state.lock();
        guard.caches.retain(|key, _| !released(&key.shared));
        guard.shared.retain(|key, _| !released(key));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::depgraph::test::spec;

    fn value(name: &str, function_id: &str, v: i64) -> ComputedValue {
        ComputedValue::new(spec(name, function_id), Value::from(v))
    }

    #[test]
    fn test_private_shadows_shared() {
        let cache = InMemoryComputationCache::new();

        cache.put_shared_value(value("Spot", "A", 1));
        assert_eq!(cache.get_value(&spec("Spot", "A")), Some(Value::from(1)));

        cache.put_private_value(value("Spot", "A", 2));
        assert_eq!(cache.get_value(&spec("Spot", "A")), Some(Value::from(2)));
        assert_eq!(cache.entries(), vec![(spec("Spot", "A"), Value::from(2))]);
    }

    #[test]
    fn test_get_values_respects_hint() {
        let cache = InMemoryComputationCache::new();
        cache.put_private_value(value("Spot", "A", 1));

        let specs = [spec("Spot", "A"), spec("Forward", "B")];
        let shared = cache.get_values(&specs, &CacheSelectHint::AllShared);
        let private = cache.get_values(&specs, &CacheSelectHint::AllPrivate);

        assert_eq!(shared[0].1, None);
        assert_eq!(private[0].1, Some(Value::from(1)));
        assert_eq!(private[1], (spec("Forward", "B"), None));
    }

    #[test]
    fn test_source_shares_partition_across_configurations() {
        let source = InMemoryComputationCacheSource::new();
        let time = ValuationTime::from_epoch_millis(1000);

        let default = source.get_cache("View", "Default", time);
        let stressed = source.get_cache("View", "Stressed", time);
        let other_time = source.get_cache("View", "Default", ValuationTime::from_epoch_millis(2000));

        default.put_shared_value(value("Spot", "A", 1));
        default.put_private_value(value("Forward", "B", 2));

        assert_eq!(stressed.get_value(&spec("Spot", "A")), Some(Value::from(1)));
        assert_eq!(stressed.get_value(&spec("Forward", "B")), None);
        assert_eq!(other_time.get_value(&spec("Spot", "A")), None);
        assert_eq!(source.cache_count(), 3);
    }

    #[test]
    fn test_source_reuses_and_releases() {
        let source = InMemoryComputationCacheSource::new();
        let time = ValuationTime::from_epoch_millis(1000);

        source
            .get_cache("View", "Default", time)
            .put_private_value(value("Forward", "B", 2));
        assert_eq!(
            source
                .get_cache("View", "Default", time)
                .get_value(&spec("Forward", "B")),
            Some(Value::from(2))
        );

        source.get_cache("Other", "Default", time);
        source.release_caches("View", time);

        assert_eq!(source.cache_count(), 1);
        assert_eq!(
            source
                .get_cache("View", "Default", time)
                .get_value(&spec("Forward", "B")),
            None
        );
    }

    #[test]
    fn test_concurrent_puts() {
        let cache = InMemoryComputationCache::new();

        std::thread::scope(|s| {
            for i in 0..64 {
                let cache = &cache;
                s.spawn(move || cache.put_private_value(value(&format!("V{}", i), "F", i)));
            }
        });

        assert_eq!(cache.entries().len(), 64);
    }
}
