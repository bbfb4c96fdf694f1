//! Live data snapshots.
//!
//! Cycles never read market data directly.
//! They ask a [`LiveDataSnapshotProvider`] for values frozen at their valuation time,
//! so every configuration of a cycle and every cycle at the same valuation time sees the same
//! market.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::change::{ChangeEvent, ChangeManager, ChangeType};
use crate::time::ValuationTime;
use crate::value::{Value, ValueRequirement};

/// Source of frozen market values.
pub trait LiveDataSnapshotProvider: Debug + Send + Sync {
    /// Value satisfying `requirement` in snapshot taken at `valuation_time`.
    ///
    /// `None` means the value is not currently available, it is not an error.
    fn query_snapshot(
        &self,
        valuation_time: ValuationTime,
        requirement: &ValueRequirement,
    ) -> Option<Value>;

    /// Drop snapshot taken at `valuation_time`.
    fn release_snapshot(&self, valuation_time: ValuationTime);
}

type Snapshot = Arc<HashMap<ValueRequirement, Value>>;

/// Provider serving market values kept in memory.
///
/// Current values can be replaced at any time, snapshots taken before are unaffected.
pub struct InMemoryLiveDataSnapshotProvider {
    current: RwLock<HashMap<ValueRequirement, Value>>,
    snapshots: Mutex<HashMap<ValuationTime, Snapshot>>,
    change_manager: Arc<dyn ChangeManager>,
}

impl InMemoryLiveDataSnapshotProvider {
    /// Create a provider announcing changed values through `change_manager`.
    pub fn new(change_manager: Arc<dyn ChangeManager>) -> Self {
        InMemoryLiveDataSnapshotProvider {
            current: Default::default(),
            snapshots: Default::default(),
            change_manager,
        }
    }

    /// Set current market value.
    ///
    /// Listeners are notified only when the value actually changes.
    pub fn add_value(&self, requirement: ValueRequirement, value: Value) {
        let change_type = {
            let mut guard = self.current.write();
            match guard.insert(requirement.clone(), value.clone()) {
                None => Some(ChangeType::Added),
                Some(previous) if previous != value => Some(ChangeType::Changed),
                Some(_) => None,
            }
        };

        if let Some(change_type) = change_type {
            self.change_manager.entity_changed(ChangeEvent {
                change_type,
                entity: requirement.target_specification().identifier().clone(),
            });
        }
    }

    /// Remove current market value.
    pub fn remove_value(&self, requirement: &ValueRequirement) {
        let removed = self.current.write().remove(requirement).is_some();

        if removed {
            self.change_manager.entity_changed(ChangeEvent {
                change_type: ChangeType::Removed,
                entity: requirement.target_specification().identifier().clone(),
            });
        }
    }

    /// Freeze current market values under `valuation_time`.
    ///
    /// Taking a snapshot at a time which already has one is a no-op.
    pub fn snapshot(&self, valuation_time: ValuationTime) {
        self.snapshot_at(valuation_time);
    }

    fn snapshot_at(&self, valuation_time: ValuationTime) -> Snapshot {
        self.snapshots
            .lock()
            .entry(valuation_time)
            .or_insert_with(|| {
                let values = self.current.read().clone();
                debug!(%valuation_time, values = values.len(), "take live data snapshot");

                Arc::new(values)
            })
            .clone()
    }

    /// Number of snapshots currently held.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().len()
    }
}

impl LiveDataSnapshotProvider for InMemoryLiveDataSnapshotProvider {
    fn query_snapshot(
        &self,
        valuation_time: ValuationTime,
        requirement: &ValueRequirement,
    ) -> Option<Value> {
        self.snapshot_at(valuation_time).get(requirement).cloned()
    }

    fn release_snapshot(&self, valuation_time: ValuationTime) {
        self.snapshots.lock().remove(&valuation_time);
    }
}

impl Debug for InMemoryLiveDataSnapshotProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(InMemoryLiveDataSnapshotProvider))
            .field("current", &self.current.read().len())
            .field("snapshots", &self.snapshots.lock().len())
            .field("change_manager", &self.change_manager)
            .finish()
    }
}
