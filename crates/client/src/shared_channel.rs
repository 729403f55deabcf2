//! Shared durable channel between sync contexts ("tabs") of one origin.
//!
//! A write lands in persistent storage and is announced to every *other*
//! context listening on the same key. The writer never hears its own write.
//!
//! Two implementations:
//! - [`LocalSharedChannel`]: contexts inside one process, through a [`SharedHub`].
//! - [`WatchedSharedChannel`]: contexts in separate processes sharing a
//!   [`KeyValueStore`] (normally a [`FileStore`](crate::storage::FileStore)),
//!   found by re-reading the watched slots on an interval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::KeyValueStore;

/// How often a [`WatchedSharedChannel`] re-reads its slots.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(500);

pub type ListenerId = u64;
pub type ExternalWriteHandler = Arc<dyn Fn(&str) + Send + Sync>;

pub trait SharedChannel: Send + Sync {
    /// Overwrite `key` with `value` and notify other contexts.
    fn write(&self, key: &str, value: &str);

    /// Register `handler` for writes to `key` made by other contexts.
    fn on_external_write(&self, key: &str, handler: ExternalWriteHandler) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}

struct HubListener {
    id: ListenerId,
    origin: Uuid,
    key: String,
    handler: ExternalWriteHandler,
}

struct HubInner {
    store: Arc<dyn KeyValueStore>,
    listeners: Mutex<Vec<HubListener>>,
    next_id: Mutex<ListenerId>,
}

/// The medium every [`LocalSharedChannel`] of one origin writes through.
#[derive(Clone)]
pub struct SharedHub {
    inner: Arc<HubInner>,
}

impl SharedHub {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                store,
                listeners: Mutex::new(Vec::new()),
                next_id: Mutex::new(0),
            }),
        }
    }

    /// A new endpoint with its own origin id.
    pub fn channel(&self) -> LocalSharedChannel {
        LocalSharedChannel {
            hub: self.clone(),
            origin: Uuid::new_v4(),
        }
    }

    /// Latest value written under `key`, from any context.
    pub fn latest(&self, key: &str) -> Option<String> {
        self.inner.store.load_raw(key)
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, Vec<HubListener>> {
        match self.inner.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// One context's endpoint on a [`SharedHub`].
#[derive(Clone)]
pub struct LocalSharedChannel {
    hub: SharedHub,
    origin: Uuid,
}

impl LocalSharedChannel {
    pub fn origin(&self) -> Uuid {
        self.origin
    }
}

impl SharedChannel for LocalSharedChannel {
    fn write(&self, key: &str, value: &str) {
        self.hub.inner.store.save_raw(key, value);

        // Handlers run outside the lock; they may register or write in turn.
        let targets: Vec<ExternalWriteHandler> = self
            .hub
            .listeners()
            .iter()
            .filter(|l| l.key == key && l.origin != self.origin)
            .map(|l| l.handler.clone())
            .collect();

        for handler in targets {
            handler(value);
        }
    }

    fn on_external_write(&self, key: &str, handler: ExternalWriteHandler) -> ListenerId {
        let id = {
            let mut next = match self.hub.inner.next_id.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *next += 1;
            *next
        };
        self.hub.listeners().push(HubListener {
            id,
            origin: self.origin,
            key: key.to_string(),
            handler,
        });
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.hub.listeners().retain(|l| l.id != id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// What a [`WatchedSharedChannel`] stores in a slot. `write_id` makes two
/// writes of the same value distinguishable.
#[derive(Debug, Serialize, Deserialize)]
struct SlotEnvelope {
    origin: Uuid,
    write_id: Uuid,
    value: String,
}

struct WatchedListener {
    id: ListenerId,
    key: String,
    handler: ExternalWriteHandler,
}

struct WatchedInner {
    store: Arc<dyn KeyValueStore>,
    origin: Uuid,
    listeners: Mutex<Vec<WatchedListener>>,
    next_id: Mutex<ListenerId>,
    /// Raw slot contents already accounted for, per key.
    seen: Mutex<HashMap<String, String>>,
}

/// A [`SharedChannel`] for contexts that only share storage, such as two
/// processes over the same config directory.
///
/// Each slot holds the latest value wrapped with the writer's origin; a
/// background task re-reads watched slots and announces changes written by
/// other origins. Dropping the channel stops the task.
pub struct WatchedSharedChannel {
    inner: Arc<WatchedInner>,
    task: JoinHandle<()>,
}

impl WatchedSharedChannel {
    /// Start watching `store` every `interval`. Must be called from within a
    /// tokio runtime.
    pub fn spawn(store: Arc<dyn KeyValueStore>, interval: Duration) -> Self {
        let inner = Arc::new(WatchedInner {
            store,
            origin: Uuid::new_v4(),
            listeners: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
            seen: Mutex::new(HashMap::new()),
        });

        let weak: Weak<WatchedInner> = Arc::downgrade(&inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.scan();
            }
        });

        Self { inner, task }
    }

    pub fn origin(&self) -> Uuid {
        self.inner.origin
    }

    /// Re-read every watched slot now instead of waiting for the next tick.
    pub fn scan(&self) {
        self.inner.scan();
    }
}

impl Drop for WatchedSharedChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl WatchedInner {
    fn scan(&self) {
        let keys: Vec<String> = {
            let mut keys: Vec<String> = lock(&self.listeners).iter().map(|l| l.key.clone()).collect();
            keys.sort();
            keys.dedup();
            keys
        };

        for key in keys {
            let Some(raw) = self.store.load_raw(&key) else {
                continue;
            };
            if lock(&self.seen).get(&key) == Some(&raw) {
                continue;
            }
            // A half-written slot fails to parse and is picked up next scan.
            let envelope = match serde_json::from_str::<SlotEnvelope>(&raw) {
                Ok(envelope) => envelope,
                Err(e) => {
                    debug!(%key, error = %e, "shared slot not readable yet");
                    continue;
                }
            };
            lock(&self.seen).insert(key.clone(), raw);
            if envelope.origin == self.origin {
                continue;
            }

            let targets: Vec<ExternalWriteHandler> = lock(&self.listeners)
                .iter()
                .filter(|l| l.key == key)
                .map(|l| l.handler.clone())
                .collect();
            debug!(%key, from = %envelope.origin, listeners = targets.len(), "external shared write");
            for handler in targets {
                handler(&envelope.value);
            }
        }
    }
}

impl SharedChannel for WatchedSharedChannel {
    fn write(&self, key: &str, value: &str) {
        let envelope = SlotEnvelope {
            origin: self.inner.origin,
            write_id: Uuid::new_v4(),
            value: value.to_string(),
        };
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%key, error = %e, "failed to encode shared write");
                return;
            }
        };
        if !self.inner.store.save_raw(key, &raw) {
            warn!(%key, "failed to persist shared write");
            return;
        }
        lock(&self.inner.seen).insert(key.to_string(), raw);
    }

    fn on_external_write(&self, key: &str, handler: ExternalWriteHandler) -> ListenerId {
        // Whatever is in the slot now predates this listener.
        if let Some(raw) = self.inner.store.load_raw(key) {
            lock(&self.inner.seen).entry(key.to_string()).or_insert(raw);
        }
        let id = {
            let mut next = lock(&self.inner.next_id);
            *next += 1;
            *next
        };
        lock(&self.inner.listeners).push(WatchedListener {
            id,
            key: key.to_string(),
            handler,
        });
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        lock(&self.inner.listeners).retain(|l| l.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};

    fn recorder() -> (ExternalWriteHandler, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Arc::new(move |v: &str| sink.lock().unwrap().push(v.to_string())), seen)
    }

    #[test]
    fn writes_reach_other_origins_only() {
        let hub = SharedHub::new(Arc::new(MemoryStore::new()));
        let tab_a = hub.channel();
        let tab_b = hub.channel();
        let (handler_a, seen_a) = recorder();
        let (handler_b, seen_b) = recorder();
        tab_a.on_external_write("k", handler_a);
        tab_b.on_external_write("k", handler_b);

        tab_a.write("k", "1");

        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(*seen_b.lock().unwrap(), vec!["1".to_string()]);
        assert_eq!(hub.latest("k").as_deref(), Some("1"));
    }

    #[test]
    fn removed_listeners_and_other_keys_are_silent() {
        let hub = SharedHub::new(Arc::new(MemoryStore::new()));
        let tab_a = hub.channel();
        let tab_b = hub.channel();
        let (handler, seen) = recorder();
        let id = tab_b.on_external_write("k", handler);

        tab_a.write("other", "x");
        tab_b.remove_listener(id);
        tab_a.write("k", "y");

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn watched_channels_see_each_others_writes_through_storage() {
        let dir = std::env::temp_dir().join(format!("walletsync-shared-{}", Uuid::new_v4()));
        let store_a: Arc<dyn KeyValueStore> = Arc::new(FileStore::at(&dir).unwrap());
        let store_b: Arc<dyn KeyValueStore> = Arc::new(FileStore::at(&dir).unwrap());
        let tab_a = WatchedSharedChannel::spawn(store_a, Duration::from_secs(3600));
        let tab_b = WatchedSharedChannel::spawn(store_b, Duration::from_secs(3600));
        let (handler_a, seen_a) = recorder();
        let (handler_b, seen_b) = recorder();
        tab_a.on_external_write("k", handler_a);
        tab_b.on_external_write("k", handler_b);

        tab_a.write("k", "1");
        tab_a.scan();
        tab_b.scan();
        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(*seen_b.lock().unwrap(), vec!["1".to_string()]);

        // Unchanged slot is not announced twice; a repeated value is.
        tab_b.scan();
        tab_a.write("k", "1");
        tab_b.scan();
        assert_eq!(seen_b.lock().unwrap().len(), 2);

        tab_b.write("k", "2");
        tab_a.scan();
        assert_eq!(*seen_a.lock().unwrap(), vec!["2".to_string()]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn watched_channel_ignores_history_and_garbage() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.save_raw("k", r#"{"origin":"00000000-0000-0000-0000-000000000000","write_id":"00000000-0000-0000-0000-000000000001","value":"old"}"#);
        let tab = WatchedSharedChannel::spawn(store.clone(), Duration::from_secs(3600));
        let (handler, seen) = recorder();
        tab.on_external_write("k", handler);

        tab.scan();
        store.save_raw("k", "{not json");
        tab.scan();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn watched_channel_scans_on_its_interval() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let writer = WatchedSharedChannel::spawn(store.clone(), Duration::from_secs(3600));
        let reader = WatchedSharedChannel::spawn(store, Duration::from_millis(500));
        let (handler, seen) = recorder();
        reader.on_external_write("k", handler);

        writer.write("k", "x");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["x".to_string()]);
    }
}
