//! Module `channel`
//!
//! A multicast event channel. Subscribers are plain callbacks kept in a
//! mutex-guarded list; emitting snapshots the list and invokes each callback
//! with the lock released, so a subscriber may subscribe, unsubscribe or call
//! back into the server without deadlocking.

use log::error;
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`EventChannel::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe channel for a single event type.
pub struct EventChannel<T> {
    name: &'static str,
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T: Clone + Send + 'static> EventChannel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a callback invoked on the task that completed the I/O.
    ///
    /// Callbacks must return quickly and must copy anything they need to
    /// keep; the event value is only borrowed for the duration of the call.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Forwards every event into an unbounded channel.
    ///
    /// The forwarding callback stays registered after the receiver is dropped
    /// but then discards events; call [`unsubscribe`](Self::unsubscribe) with
    /// the returned id to remove it.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |event: &T| {
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(sub, _)| *sub != id);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Delivers `event` to every current subscriber.
    ///
    /// Events with no subscribers are dropped. A panicking subscriber is
    /// logged and skipped; it never unwinds into the caller.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Handler<T>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Subscriber to {} panicked", self.name);
            }
        }
    }
}

impl<T> std::fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("name", &self.name)
            .field("subscribers", &self.handlers.lock().len())
            .finish()
    }
}
