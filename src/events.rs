//! In-process event bus for version lifecycle notifications.
//!
//! Scope:
//! - Local (in-process) pub/sub: the manager publishes an event after the
//!   corresponding state change is visible to lookups.
//! - Drop of EventSubscription unsubscribes.
//!
//! Notes:
//! - Callbacks are executed synchronously in the calling thread, outside
//!   the manager's ordering lock. Keep callbacks fast and non-blocking;
//!   if you need async work, spawn a thread/task.
//! - Created fires only after the record is confirmed linked; Destroyed
//!   only after the record is fully removed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::versions::VersionId;

/// A single lifecycle event emitted by the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionEvent {
    Created(VersionId),
    Destroyed(VersionId),
}

type Callback = Arc<dyn Fn(&VersionEvent) + Send + Sync + 'static>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subs: HashMap<u64, Callback>,
}

/// Event bus (one per manager).
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(BusInner::default()),
        })
    }

    /// Subscribe to all lifecycle events.
    /// Returns a handle; dropping it unsubscribes.
    pub fn subscribe(self: &Arc<Self>, cb: Callback) -> EventSubscription {
        let mut g = self.inner.lock().unwrap();
        let id = g.next_id;
        g.next_id = g.next_id.wrapping_add(1);
        g.subs.insert(id, cb);
        drop(g);
        EventSubscription {
            id,
            bus: Arc::downgrade(self),
        }
    }

    /// Publish an event to every subscriber.
    pub fn publish(&self, ev: &VersionEvent) {
        let callbacks: Vec<Callback> = {
            let g = self.inner.lock().unwrap();
            g.subs.values().cloned().collect()
        };
        // Execute outside the bus lock
        for cb in callbacks {
            cb(ev);
        }
    }

    /// Unsubscribe by id (best-effort).
    fn unsubscribe(&self, id: u64) {
        let mut g = self.inner.lock().unwrap();
        g.subs.remove(&id);
    }
}

/// RAII handle: unsubscribes on drop.
pub struct EventSubscription {
    id: u64,
    bus: Weak<EventBus>,
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Public helper for building callbacks.
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&VersionEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
