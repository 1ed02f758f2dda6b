use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::key::{CacheKey, KeyPrefix};

type BoxedFetch = Pin<Box<dyn Future<Output = Result<Value, SyncError>> + Send>>;
type Fetcher = Arc<dyn Fn() -> BoxedFetch + Send + Sync>;

/// Callback invoked synchronously after every successful fetch or write of
/// the subscribed key.
pub type Observer = Arc<dyn Fn(&CacheKey, &Value) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a fetched value counts as fresh without refetching.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Default)]
struct Entry {
    value: Option<Value>,
    stale: bool,
    fetched_at: Option<Instant>,
    /// Last fetcher registered for this key, retained so invalidation can
    /// refetch in the background without a consumer driving the read.
    fetcher: Option<Fetcher>,
    /// Present while exactly one fetch for this key is in flight; late
    /// callers join it instead of issuing a duplicate request.
    inflight: Option<broadcast::Sender<Result<Value, SyncError>>>,
    /// Bumped on every invalidation. A fetch captures the generation at
    /// start; a response from a superseded generation may not clear the
    /// staleness an invalidation set while it was in flight.
    generation: u64,
    observers: HashMap<Uuid, Observer>,
    idle_since: Option<Instant>,
}

impl Entry {
    fn fresh_value(&self, ttl: Duration) -> Option<Value> {
        if self.stale {
            return None;
        }
        let value = self.value.as_ref()?;
        let fetched_at = self.fetched_at?;
        (fetched_at.elapsed() < ttl).then(|| value.clone())
    }

    fn mark_idle_if_unobserved(&mut self) {
        if self.observers.is_empty() && self.idle_since.is_none() {
            self.idle_since = Some(Instant::now());
        }
    }
}

struct Shared {
    cfg: CacheConfig,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

/// Keyed store of fetched entities shared across views.
///
/// Explicitly constructed at application startup and passed to consumers by
/// handle; cloning shares the same store.
#[derive(Clone)]
pub struct RemoteCache {
    shared: Arc<Shared>,
}

enum ReadPlan {
    Hit(Value),
    Join(broadcast::Receiver<Result<Value, SyncError>>),
    Fetch { start_gen: u64 },
}

impl RemoteCache {
    pub fn new(cfg: CacheConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                cfg,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Read through the cache, fetching only when no fresh entry exists and
    /// no identical fetch is already in flight.
    ///
    /// The fetcher is retained per entry so later invalidations can refetch
    /// in the background.
    pub async fn read<F, Fut>(&self, key: CacheKey, fetch: F) -> Result<Value, SyncError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, SyncError>> + Send + 'static,
    {
        let fetcher: Fetcher = Arc::new(move || Box::pin(fetch()));

        let plan = {
            let mut entries = self.shared.entries.lock().expect("cache lock poisoned");
            let entry = entries.entry(key.clone()).or_default();
            entry.mark_idle_if_unobserved();
            entry.fetcher = Some(Arc::clone(&fetcher));

            if let Some(value) = entry.fresh_value(self.shared.cfg.ttl) {
                ReadPlan::Hit(value)
            } else if let Some(tx) = &entry.inflight {
                ReadPlan::Join(tx.subscribe())
            } else {
                let (tx, _) = broadcast::channel(1);
                entry.inflight = Some(tx);
                ReadPlan::Fetch {
                    start_gen: entry.generation,
                }
            }
        };

        match plan {
            ReadPlan::Hit(value) => {
                trace!(%key, "cache hit");
                Ok(value)
            }
            ReadPlan::Join(mut rx) => {
                trace!(%key, "joining in-flight fetch");
                rx.recv().await.map_err(|_| SyncError::FetchInterrupted)?
            }
            ReadPlan::Fetch { start_gen } => self.run_fetch(key, fetcher, start_gen).await,
        }
    }

    /// Set an entry directly without a network round-trip (optimistic
    /// patches). Subscribers are notified synchronously.
    pub fn write(&self, key: CacheKey, value: Value) {
        let observers = {
            let mut entries = self.shared.entries.lock().expect("cache lock poisoned");
            let entry = entries.entry(key.clone()).or_default();
            entry.mark_idle_if_unobserved();
            entry.value = Some(value.clone());
            entry.stale = false;
            entry.fetched_at = Some(Instant::now());
            collect_observers(entry)
        };
        notify(&key, &value, observers);
    }

    /// Current value regardless of staleness.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let entries = self.shared.entries.lock().expect("cache lock poisoned");
        entries.get(key).and_then(|e| e.value.clone())
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        let entries = self.shared.entries.lock().expect("cache lock poisoned");
        entries.get(key).is_none_or(|e| e.stale)
    }

    /// Mark every entry under `prefix` stale. Entries with live subscribers
    /// and a retained fetcher are refetched in the background; the rest
    /// refetch lazily on their next read. An entry whose fetch is already in
    /// flight stays stale when that fetch lands: the response belongs to a
    /// superseded generation.
    pub fn invalidate(&self, prefix: &KeyPrefix) {
        let refetches = {
            let mut entries = self.shared.entries.lock().expect("cache lock poisoned");
            let mut refetches = Vec::new();
            for (key, entry) in entries.iter_mut() {
                if !key.matches(prefix) {
                    continue;
                }
                entry.stale = true;
                entry.generation = entry.generation.wrapping_add(1);
                if entry.inflight.is_some() || entry.observers.is_empty() {
                    continue;
                }
                let Some(fetcher) = entry.fetcher.clone() else {
                    continue;
                };
                let (tx, _) = broadcast::channel(1);
                entry.inflight = Some(tx);
                refetches.push((key.clone(), fetcher, entry.generation));
            }
            refetches
        };

        for (key, fetcher, start_gen) in refetches {
            debug!(%key, "invalidated, refetching in background");
            self.spawn_refetch(key, fetcher, start_gen);
        }
    }

    /// Register for change notification. The returned handle deregisters on
    /// drop; hold it for exactly as long as the consuming view is mounted.
    pub fn subscribe(
        &self,
        key: CacheKey,
        observer: impl Fn(&CacheKey, &Value) + Send + Sync + 'static,
    ) -> Subscription {
        let id = Uuid::new_v4();
        {
            let mut entries = self.shared.entries.lock().expect("cache lock poisoned");
            let entry = entries.entry(key.clone()).or_default();
            entry.observers.insert(id, Arc::new(observer));
            entry.idle_since = None;
        }
        Subscription {
            shared: Arc::downgrade(&self.shared),
            key,
            id,
        }
    }

    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        let entries = self.shared.entries.lock().expect("cache lock poisoned");
        entries.get(key).map_or(0, |e| e.observers.len())
    }

    /// Drop entries that have been without subscribers for at least `grace`.
    /// Purely an optimization; stale-but-needed data is refetched on demand.
    pub fn evict_idle(&self, grace: Duration) -> usize {
        let mut entries = self.shared.entries.lock().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, e| {
            e.inflight.is_some()
                || !e.observers.is_empty()
                || e.idle_since.is_none_or(|t| t.elapsed() < grace)
        });
        before - entries.len()
    }

    pub(crate) fn keys_matching(&self, prefix: &KeyPrefix) -> Vec<CacheKey> {
        let entries = self.shared.entries.lock().expect("cache lock poisoned");
        entries
            .iter()
            .filter(|(key, entry)| key.matches(prefix) && entry.value.is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Put an entry back to its pre-mutation snapshot. A `None` prior means
    /// the entry had no value; it is left empty and stale.
    pub(crate) fn restore(&self, key: &CacheKey, prior: Option<Value>) {
        match prior {
            Some(value) => self.write(key.clone(), value),
            None => {
                let mut entries = self.shared.entries.lock().expect("cache lock poisoned");
                if let Some(entry) = entries.get_mut(key) {
                    entry.value = None;
                    entry.stale = true;
                }
            }
        }
    }

    async fn run_fetch(
        &self,
        key: CacheKey,
        fetcher: Fetcher,
        start_gen: u64,
    ) -> Result<Value, SyncError> {
        debug!(%key, "fetching");
        let result = fetcher().await;

        let (tx, observers, followup) = {
            let mut entries = self.shared.entries.lock().expect("cache lock poisoned");
            let Some(entry) = entries.get_mut(&key) else {
                // Evicted while the fetch was in flight.
                return result;
            };
            let tx = entry.inflight.take();
            let mut followup = None;
            let observers = match &result {
                Ok(value) => {
                    entry.value = Some(value.clone());
                    entry.fetched_at = Some(Instant::now());
                    if entry.generation == start_gen {
                        entry.stale = false;
                    } else if let Some(fetcher) = entry
                        .fetcher
                        .clone()
                        .filter(|_| !entry.observers.is_empty())
                    {
                        // Invalidated mid-flight: the value on hand predates
                        // the invalidation, so the entry stays stale and live
                        // subscribers get a fresh fetch.
                        let (next_tx, _) = broadcast::channel(1);
                        entry.inflight = Some(next_tx);
                        followup = Some((fetcher, entry.generation));
                    }
                    collect_observers(entry)
                }
                Err(err) => {
                    warn!(%key, error = %err, "fetch failed, entry left stale");
                    entry.stale = true;
                    Vec::new()
                }
            };
            (tx, observers, followup)
        };

        if let Ok(value) = &result {
            notify(&key, value, observers);
        }
        if let Some(tx) = tx {
            let _ = tx.send(result.clone());
        }
        if let Some((fetcher, next_gen)) = followup {
            debug!(%key, "fetch superseded by invalidation, refetching");
            self.spawn_refetch(key, fetcher, next_gen);
        }
        result
    }

    fn spawn_refetch(&self, key: CacheKey, fetcher: Fetcher, start_gen: u64) {
        let cache = self.clone();
        tokio::spawn(async move {
            let _ = cache.run_fetch(key, fetcher, start_gen).await;
        });
    }
}

impl Default for RemoteCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Deregistration handle returned by [`RemoteCache::subscribe`].
pub struct Subscription {
    shared: Weak<Shared>,
    key: CacheKey,
    id: Uuid,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut entries = shared.entries.lock().expect("cache lock poisoned");
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.observers.remove(&self.id);
            entry.mark_idle_if_unobserved();
        }
    }
}

fn collect_observers(entry: &Entry) -> Vec<Observer> {
    entry.observers.values().cloned().collect()
}

// Observers run outside the cache lock so they may read back into the cache.
fn notify(key: &CacheKey, value: &Value, observers: Vec<Observer>) {
    for observer in observers {
        observer(key, value);
    }
}
