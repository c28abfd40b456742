use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::watch;

use crate::error::{Result, ZimuError};
use crate::transcript::{CacheKey, TranscriptLine};

/// Final outcome of one computation as seen by every waiter.
pub type SharedOutcome = std::result::Result<Vec<TranscriptLine>, String>;

type Slot = Option<SharedOutcome>;

/// Backing map for completed segment results.
pub trait SegmentStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Vec<TranscriptLine>>;
    fn set(&self, key: CacheKey, lines: Vec<TranscriptLine>);
    fn len(&self) -> usize;

    fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }
}

/// Process-lifetime store with no eviction.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<CacheKey, Vec<TranscriptLine>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SegmentStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Option<Vec<TranscriptLine>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: CacheKey, lines: Vec<TranscriptLine>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, lines);
    }

    fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Handle to a pending computation. Any number of these may wait on the
/// same key.
#[derive(Clone)]
pub struct Inflight {
    key: CacheKey,
    rx: watch::Receiver<Slot>,
}

impl Inflight {
    pub async fn wait(mut self) -> Result<Vec<TranscriptLine>> {
        let outcome = match self.rx.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };

        match outcome {
            Some(Ok(lines)) => Ok(lines),
            Some(Err(message)) => Err(ZimuError::Server(message)),
            None => Err(ZimuError::InflightAbandoned(self.key.to_string())),
        }
    }
}

/// Publishing side of an in-flight registration, owned by the single task
/// doing the work.
///
/// Dropping it without calling [`Completion::finish`] still removes the
/// registration, and waiters then see [`ZimuError::InflightAbandoned`].
pub struct Completion {
    cache: Arc<SegmentCache>,
    key: CacheKey,
    tx: Option<watch::Sender<Slot>>,
}

impl Completion {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Clears the registration, stores successful results, then wakes every
    /// waiter. The first two steps happen under the registry lock so no
    /// request can observe "neither cached nor in flight" in between.
    pub fn finish(mut self, outcome: SharedOutcome) {
        {
            let mut inflight = self.cache.lock_inflight();
            if let Ok(lines) = &outcome {
                self.cache.store.set(self.key.clone(), lines.clone());
            }
            inflight.remove(&self.key);
        }

        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome));
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(key = %self.key, "In-flight computation dropped before finishing");
            self.cache.clear_inflight(&self.key);
        }
    }
}

/// Result of an atomic check of cache and registry for one key.
pub enum Lookup {
    Hit(Vec<TranscriptLine>),
    Joined(Inflight),
    Started(Completion, Inflight),
}

/// Completed results plus the registry of computations still running.
pub struct SegmentCache {
    store: Arc<dyn SegmentStore>,
    inflight: Mutex<HashMap<CacheKey, watch::Receiver<Slot>>>,
}

impl SegmentCache {
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self {
            store,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<CacheKey, watch::Receiver<Slot>>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has(&self, key: &CacheKey) -> bool {
        self.store.contains(key)
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<TranscriptLine>> {
        self.store.get(key)
    }

    pub fn set(&self, key: CacheKey, lines: Vec<TranscriptLine>) {
        self.store.set(key, lines);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn get_inflight(&self, key: &CacheKey) -> Option<Inflight> {
        self.lock_inflight().get(key).map(|rx| Inflight {
            key: key.clone(),
            rx: rx.clone(),
        })
    }

    pub fn set_inflight(&self, key: CacheKey, rx: watch::Receiver<Slot>) {
        self.lock_inflight().insert(key, rx);
    }

    pub fn clear_inflight(&self, key: &CacheKey) {
        self.lock_inflight().remove(key);
    }

    pub fn inflight_count(&self) -> usize {
        self.lock_inflight().len()
    }

    /// Returns the cached value (unless `bypass_cache`), else attaches to the
    /// pending computation, else registers a new one. The whole decision is
    /// made under one lock, so at most one computation per key can start.
    pub fn lookup(self: &Arc<Self>, key: &CacheKey, bypass_cache: bool) -> Lookup {
        let mut inflight = self.lock_inflight();

        if !bypass_cache {
            if let Some(lines) = self.store.get(key) {
                return Lookup::Hit(lines);
            }
        }

        if let Some(rx) = inflight.get(key) {
            return Lookup::Joined(Inflight {
                key: key.clone(),
                rx: rx.clone(),
            });
        }

        let (tx, rx) = watch::channel(None);
        inflight.insert(key.clone(), rx.clone());

        let completion = Completion {
            cache: Arc::clone(self),
            key: key.clone(),
            tx: Some(tx),
        };
        let waiter = Inflight {
            key: key.clone(),
            rx,
        };
        Lookup::Started(completion, waiter)
    }
}
