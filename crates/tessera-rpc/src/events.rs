//! Minimal synchronous pub/sub.
//!
//! Each event name has its own listener list. [`EventDispatcher::dispatch`]
//! calls listeners from a snapshot taken before the first call, so a listener
//! may remove itself or others while the dispatch is running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A listener callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned on subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry<T> {
    id: ListenerId,
    listener: Listener<T>,
    once: bool,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: self.listener.clone(),
            once: self.once,
        }
    }
}

/// Fan-out of one value to every listener registered under an event name.
pub struct EventDispatcher<T> {
    listeners: Mutex<HashMap<String, Vec<Entry<T>>>>,
    next_id: AtomicU64,
}

impl<T> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T> std::fmt::Debug for EventDispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<String, usize> = self
            .lock()
            .iter()
            .map(|(event, entries)| (event.clone(), entries.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("listeners", &counts)
            .finish()
    }
}

impl<T> EventDispatcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Entry<T>>>> {
        // Listeners never run under the lock, so poisoning cannot leave the
        // map half-updated.
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn subscribe(&self, event: &str, listener: Listener<T>, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(event.to_string())
            .or_default()
            .push(Entry { id, listener, once });
        id
    }

    /// Subscribe to `event`.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(event, Arc::new(listener), false)
    }

    /// Subscribe to `event`; the listener is removed before its first call.
    pub fn once<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(event, Arc::new(listener), true)
    }

    /// Alias of [`on`](Self::on).
    pub fn add_event_listener<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on(event, listener)
    }

    /// Unsubscribe. Returns whether a listener was removed.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let Some(entries) = listeners.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Alias of [`off`](Self::off).
    pub fn remove_event_listener(&self, event: &str, id: ListenerId) -> bool {
        self.off(event, id)
    }

    /// Call every listener of `event` with `value`. Returns how many ran.
    pub fn dispatch(&self, event: &str, value: &T) -> usize {
        let snapshot: Vec<Entry<T>> = {
            let mut listeners = self.lock();
            let Some(entries) = listeners.get_mut(event) else {
                return 0;
            };
            let snapshot = entries.clone();
            entries.retain(|entry| !entry.once);
            if entries.is_empty() {
                listeners.remove(event);
            }
            snapshot
        };

        for entry in &snapshot {
            (entry.listener)(value);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().get(event).map(Vec::len).unwrap_or(0)
    }

    /// Remove every listener of every event.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
