//! In-memory entity state registry and change feed.
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::model::StateChange;

/// Lookup of an entity's current value.
pub trait StateRegistry: Send + Sync {
    fn state(&self, entity_id: &str) -> Option<String>;
}

/// Receives every state change. `new_state` is `None` when the entity was removed.
pub trait StateSubscriber: Send + Sync {
    fn on_state_changed(&self, entity_id: &str, new_state: Option<&str>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct StateStore {
    states: RwLock<HashMap<String, String>>,
    subscribers: Mutex<Vec<(SubscriptionId, Arc<dyn StateSubscriber>)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("entities", &self.states.read().len())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, entity_id: &str, state: &str) {
        self.states
            .write()
            .insert(entity_id.to_string(), state.to_string());
        self.notify(entity_id, Some(state));
    }

    pub fn remove(&self, entity_id: &str) {
        self.states.write().remove(entity_id);
        self.notify(entity_id, None);
    }

    pub fn apply(&self, change: &StateChange) {
        match change.new_state.as_deref() {
            Some(state) => self.set(&change.entity_id, state),
            None => self.remove(&change.entity_id),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn StateSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, subscriber));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn notify(&self, entity_id: &str, new_state: Option<&str>) {
        // Snapshot so subscribers may (un)subscribe from inside the callback.
        let subscribers: Vec<_> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            subscriber.on_state_changed(entity_id, new_state);
        }
    }
}

impl StateRegistry for StateStore {
    fn state(&self, entity_id: &str) -> Option<String> {
        self.states.read().get(entity_id).cloned()
    }
}
