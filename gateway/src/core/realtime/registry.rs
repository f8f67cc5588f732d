//! Subscription registry for upstream events.
//!
//! Each adapter owns one [`EventRegistry`]. Subscribing appends an entry and
//! hands back a [`Disposer`] bound to that entry only. Dispatch walks the
//! entries in registration order, so a wildcard registered before a
//! kind-specific subscription always sees an event first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::base::{EventFilter, UpstreamEvent};

/// Callback invoked for every matching event.
pub type EventCallback = Arc<dyn Fn(&UpstreamEvent) + Send + Sync>;

struct Entry {
    id: u64,
    filter: EventFilter,
    callback: EventCallback,
    active: AtomicBool,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    entries: Vec<Arc<Entry>>,
}

/// Ordered list of (filter, callback) registrations.
#[derive(Clone, Default)]
pub struct EventRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events matching `filter`.
    pub fn subscribe(&self, filter: EventFilter, callback: EventCallback) -> Disposer {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        let entry = Arc::new(Entry {
            id,
            filter,
            callback,
            active: AtomicBool::new(true),
        });
        inner.entries.push(entry.clone());

        Disposer {
            entry,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every active matching subscription.
    ///
    /// The lock is released before callbacks run, so a callback may dispose
    /// its own or any other subscription. An entry disposed mid-dispatch is
    /// skipped.
    pub fn dispatch(&self, event: &UpstreamEvent) {
        let kind = event.kind();
        let targets: Vec<Arc<Entry>> = {
            let inner = self.inner.lock();
            inner
                .entries
                .iter()
                .filter(|e| e.filter.matches(kind))
                .cloned()
                .collect()
        };

        for entry in targets {
            if entry.active.load(Ordering::Acquire) {
                (entry.callback)(event);
            }
        }
    }

    /// Invalidate every subscription. Outstanding disposers become no-ops.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut self.inner.lock().entries);
        for entry in &entries {
            entry.active.store(false, Ordering::Release);
        }
        if !entries.is_empty() {
            tracing::debug!(count = entries.len(), "Cleared upstream event subscriptions");
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reverses exactly one [`EventRegistry::subscribe`] call.
///
/// Disposing twice, or after the registry was cleared or dropped, does
/// nothing.
pub struct Disposer {
    entry: Arc<Entry>,
    registry: Weak<Mutex<RegistryInner>>,
}

impl Disposer {
    /// Remove the subscription. Returns `true` only on the call that actually
    /// removed it.
    pub fn dispose(&self) -> bool {
        if !self.entry.active.swap(false, Ordering::AcqRel) {
            return false;
        }

        if let Some(inner) = self.registry.upgrade() {
            let id = self.entry.id;
            inner.lock().entries.retain(|e| e.id != id);
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.entry.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("id", &self.entry.id)
            .field("filter", &self.entry.filter)
            .field("active", &self.is_active())
            .finish()
    }
}
