//! Change notification.
//!
//! Components announcing that an entity changed do so through a [`ChangeManager`] they were
//! handed at construction.
//! There is no process-wide manager: a component which has nobody to notify is simply given
//! a [`NoopChangeManager`].

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::value::UniqueId;

/// What happened to an entity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ChangeType {
    /// Entity appeared.
    Added,
    /// Entity was modified.
    Changed,
    /// Entity disappeared.
    Removed,
}

/// Notification about a single entity.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ChangeEvent {
    /// What happened.
    pub change_type: ChangeType,
    /// Which entity it happened to.
    pub entity: UniqueId,
}

/// Receiver of change notifications.
pub trait ChangeListener: Send + Sync {
    /// Handle a notification.
    fn entity_changed(&self, event: &ChangeEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn entity_changed(&self, event: &ChangeEvent) {
        self(event)
    }
}

/// Token identifying a registered listener.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ListenerId(u64);

/// Capability to register listeners and broadcast notifications to them.
pub trait ChangeManager: Debug + Send + Sync {
    /// Register a listener.
    fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId;

    /// Unregister a listener.
    ///
    /// Returns `false` if the listener was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Broadcast a notification to every registered listener.
    fn entity_changed(&self, event: ChangeEvent);
}

/// Manager which drops every notification.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoopChangeManager;

impl ChangeManager for NoopChangeManager {
    fn add_listener(&self, _listener: Arc<dyn ChangeListener>) -> ListenerId {
        ListenerId(0)
    }

    fn remove_listener(&self, _id: ListenerId) -> bool {
        false
    }

    fn entity_changed(&self, _event: ChangeEvent) {}
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<dyn ChangeListener>)>,
}

/// Manager delivering notifications synchronously on the announcing thread.
#[derive(Default)]
pub struct BasicChangeManager {
    listeners: Mutex<Listeners>,
}

impl BasicChangeManager {
    /// Create a manager with no listeners.
    pub fn new() -> Self {
        Default::default()
    }
}

impl ChangeManager for BasicChangeManager {
    fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let mut guard = self.listeners.lock();
        guard.next_id += 1;

        let id = ListenerId(guard.next_id);
        guard.listeners.push((id, listener));

        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.lock();
        let before = guard.listeners.len();
        guard.listeners.retain(|(listener_id, _)| *listener_id != id);

        guard.listeners.len() != before
    }

    fn entity_changed(&self, event: ChangeEvent) {
        // Listeners may register other listeners, so they are called with the lock released.
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        debug!(entity = %event.entity, change = ?event.change_type, listeners = listeners.len(), "entity changed");

        for listener in listeners {
            listener.entity_changed(&event);
        }
    }
}

impl Debug for BasicChangeManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(BasicChangeManager))
            .field("listeners", &self.listeners.lock().listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn event() -> ChangeEvent {
        ChangeEvent {
            change_type: ChangeType::Changed,
            entity: UniqueId::of("Ticker", "AAPL"),
        }
    }

    #[test]
    fn test_basic_delivers_until_removed() {
        let manager = BasicChangeManager::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let id = {
            let counter = counter.clone();
            manager.add_listener(Arc::new(move |_: &ChangeEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
        };

        manager.entity_changed(event());
        assert!(manager.remove_listener(id));
        assert!(!manager.remove_listener(id));
        manager.entity_changed(event());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop() {
        let manager = NoopChangeManager;
        let id = manager.add_listener(Arc::new(|_: &ChangeEvent| panic!("should not be called")));

        manager.entity_changed(event());

        assert!(!manager.remove_listener(id));
    }
}
