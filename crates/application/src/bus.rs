use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::error;

use crate::ui::UiHandle;
use domain::{AppEvent, EventType};

/// Subscriber callback. Identity (`Arc::ptr_eq`) is what dedup and
/// unsubscribe key on.
pub type Subscriber = Arc<dyn Fn(&AppEvent) + Send + Sync>;

/// Pure fan-out pub/sub keyed by event kind.
///
/// Synchronous, at-most-once-per-publish delivery in subscription order on
/// the calling thread. No persistence, no replay, no back-pressure.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<EventType, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register for one event kind. Subscribing the same callback (same
    /// `Arc`) twice for the same kind is a no-op, not a double-fire.
    pub fn subscribe(&self, event_type: EventType, callback: Subscriber) {
        let mut subscribers = self.subscribers.lock();
        let entry = subscribers.entry(event_type).or_default();
        if !entry.iter().any(|existing| Arc::ptr_eq(existing, &callback)) {
            entry.push(callback);
        }
    }

    /// Best-effort removal; missing entries are silently ignored.
    pub fn unsubscribe(&self, event_type: EventType, callback: &Subscriber) {
        let mut subscribers = self.subscribers.lock();
        if let Some(entry) = subscribers.get_mut(&event_type) {
            entry.retain(|existing| !Arc::ptr_eq(existing, callback));
        }
    }

    /// Invoke all subscribers for the event's kind, in subscription order.
    /// A panicking subscriber is caught and logged; the remaining
    /// subscribers still run.
    pub fn publish(&self, event: &AppEvent) {
        for callback in self.subscribers_for(event.kind()) {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(event_type = ?event.kind(), "Error in event handler");
            }
        }
    }

    /// Publish with subscriber bodies marshaled onto the UI thread: each
    /// invocation is posted to the handle and executes when the UI queue
    /// drains. Posting order follows subscription order.
    pub fn publish_deferred(&self, event: AppEvent, ui: &UiHandle) {
        for callback in self.subscribers_for(event.kind()) {
            let event = event.clone();
            ui.post(move || callback(&event));
        }
    }

    fn subscribers_for(&self, event_type: EventType) -> Vec<Subscriber> {
        // Clone the list out of the lock so subscribers may re-enter the
        // bus.
        self.subscribers
            .lock()
            .get(&event_type)
            .cloned()
            .unwrap_or_default()
    }
}
