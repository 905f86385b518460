use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use aika_lib::TagValue;
use parking_lot::Mutex;

/// Event delivered to a tag's snapshot subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotEvent {
    /// A snapshot-accepted sample.
    Value(TagValue),
    /// One-shot: the tag was deleted. No further events follow and every
    /// outstanding handle becomes inert.
    Deleted,
}

pub type SnapshotCallback = Box<dyn Fn(&SnapshotEvent) + Send + Sync>;

/// The subscriber set owned by a tag. Callbacks run synchronously on the
/// snapshot writer's thread and must not block.
pub(crate) struct SubscriberSet {
    next_id: AtomicU64,
    closed: AtomicBool,
    subscribers: Mutex<HashMap<u64, SnapshotCallback>>,
}

impl SubscriberSet {
    pub fn new() -> Arc<Self> {
        Arc::new(SubscriberSet {
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    pub fn subscribe(self: &Arc<Self>, callback: SnapshotCallback) -> SnapshotSubscription {
        if self.closed.load(Ordering::Acquire) {
            // Subscribing to a deleted tag yields an inert handle.
            return SnapshotSubscription {
                set: Weak::new(),
                id: 0,
            };
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, callback);
        SnapshotSubscription {
            set: Arc::downgrade(self),
            id,
        }
    }

    pub fn notify(&self, event: &SnapshotEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        for callback in self.subscribers.lock().values() {
            callback(event);
        }
    }

    /// Emits the one-shot deletion event and drops every subscriber.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscribers = std::mem::take(&mut *self.subscribers.lock());
        for callback in subscribers.values() {
            callback(&SnapshotEvent::Deleted);
        }
    }
}

/// Scoped subscription to a tag's snapshot stream; dropping the handle
/// unsubscribes.
pub struct SnapshotSubscription {
    set: Weak<SubscriberSet>,
    id: u64,
}

impl Drop for SnapshotSubscription {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.subscribers.lock().remove(&self.id);
        }
    }
}
