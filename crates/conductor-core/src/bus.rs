//! EventBus - in-process ordered publish/subscribe.
//!
//! Contract:
//! - Delivery is synchronous and in emission order per listener.
//! - A panicking listener never reaches orchestration logic: panics are
//!   caught at the bus boundary and logged.
//! - Zero listeners cost nothing beyond the event value itself.
//!
//! Listeners run on the publishing thread, so they must not call back into
//! async queue methods (that would block the publisher on themselves).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::domain::OrchestratorEvent;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A subscriber to orchestration events.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &OrchestratorEvent);
}

/// Closures subscribe directly.
impl<F> EventListener for F
where
    F: Fn(&OrchestratorEvent) + Send + Sync,
{
    fn on_event(&self, event: &OrchestratorEvent) {
        self(event);
    }
}

/// Minimal in-process pub/sub.
pub struct EventBus {
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn EventListener>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.push((id, listener));
        id
    }

    /// Convenience wrapper for closure listeners.
    pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(f))
    }

    /// Remove a listener. Returns whether it was present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Deliver `event` to every listener, in subscription order.
    ///
    /// The registry lock is not held during delivery, so a listener may
    /// subscribe/unsubscribe reentrantly; such changes take effect from the
    /// next publish.
    pub fn publish(&self, event: &OrchestratorEvent) {
        let snapshot: Vec<Arc<dyn EventListener>> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            if listeners.is_empty() {
                return;
            }
            listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if result.is_err() {
                warn!(kind = %event.kind, "event listener panicked; continuing");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
