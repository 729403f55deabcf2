//! In-process publish/subscribe for balance updates, bridged to other
//! contexts through a [`SharedChannel`].
//!
//! Delivery inside one context is synchronous and in registration order.
//! Updates arriving from another context are dispatched locally and never
//! written back to the shared slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};
use walletsync_shared::BalanceUpdate;

use crate::shared_channel::{ListenerId, SharedChannel};
use crate::storage::BALANCE_UPDATE_KEY;

type Handler = Arc<dyn Fn(&BalanceUpdate) + Send + Sync>;

struct BusInner {
    listeners: Mutex<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
    shared: Option<(Arc<dyn SharedChannel>, ListenerId)>,
}

impl BusInner {
    fn dispatch_local(&self, update: &BalanceUpdate) {
        let handlers: Vec<Handler> = match self.listeners.lock() {
            Ok(guard) => guard.iter().map(|(_, h)| h.clone()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(_, h)| h.clone()).collect(),
        };
        if handlers.is_empty() {
            debug!("balance update published with no listeners");
        }
        for handler in handlers {
            handler(update);
        }
    }

    fn remove(&self, id: u64) {
        match self.listeners.lock() {
            Ok(mut guard) => guard.retain(|(i, _)| *i != id),
            Err(poisoned) => poisoned.into_inner().retain(|(i, _)| *i != id),
        }
    }
}

impl Drop for BusInner {
    fn drop(&mut self) {
        if let Some((channel, id)) = &self.shared {
            channel.remove_listener(*id);
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// A bus confined to this context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                shared: None,
            }),
        }
    }

    /// A bus that also propagates through `channel` to other contexts.
    pub fn with_shared_channel(channel: Arc<dyn SharedChannel>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<BusInner>| {
            let weak = weak.clone();
            let id = channel.on_external_write(
                BALANCE_UPDATE_KEY,
                Arc::new(move |raw: &str| {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    match serde_json::from_str::<BalanceUpdate>(raw) {
                        Ok(update) => inner.dispatch_local(&update),
                        Err(e) => warn!(error = %e, "ignoring malformed cross-context update"),
                    }
                }),
            );
            BusInner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                shared: Some((channel, id)),
            }
        });
        Self { inner }
    }

    /// Register `handler`. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe(&self, handler: impl Fn(&BalanceUpdate) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        match self.inner.listeners.lock() {
            Ok(mut guard) => guard.push((id, Arc::new(handler))),
            Err(poisoned) => poisoned.into_inner().push((id, Arc::new(handler))),
        }
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Fire-and-forget: deliver to local listeners, then to other contexts.
    pub fn publish(&self, update: BalanceUpdate) {
        self.inner.dispatch_local(&update);

        if let Some((channel, _)) = &self.inner.shared {
            match serde_json::to_string(&update) {
                Ok(json) => channel.write(BALANCE_UPDATE_KEY, &json),
                Err(e) => warn!(error = %e, "failed to serialize balance update"),
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        match self.inner.listeners.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Keeps a handler registered on an [`EventBus`].
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    bus: Weak<BusInner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}
