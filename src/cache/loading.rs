use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::future::Future;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::time::Instant;

const SHARDS: usize = 16;

type Loader<V> = Arc<dyn Fn(&str) -> BoxFuture<'static, V> + Send + Sync>;

/// One key's slot. The value cell is filled at most once; every caller that
/// arrives while it is empty waits on the same load.
struct CacheEntry<V> {
    value: OnceCell<V>,
    last_access: Mutex<Instant>,
    // Invalidated while its load was still running.
    stale: AtomicBool,
}

impl<V> CacheEntry<V> {
    fn new(now: Instant) -> Self {
        Self {
            value: OnceCell::new(),
            last_access: Mutex::new(now),
            stale: AtomicBool::new(false),
        }
    }

    fn touch(&self, now: Instant) {
        *self.last_access.lock() = now;
    }

    fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_access.lock())
    }

    fn is_loaded(&self) -> bool {
        self.value.initialized()
    }

    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    // In-flight loads never expire, otherwise late arrivals would start a
    // second load for the same key.
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.is_loaded() && (self.is_stale() || self.idle(now) > ttl)
    }
}

type Shard<V> = Mutex<HashMap<String, Arc<CacheEntry<V>>>>;

// Must be called with the shard locked: callers only clone a slot under the
// lock, so a count of one means nobody is waiting on it.
fn is_abandoned<V>(entry: &Arc<CacheEntry<V>>) -> bool {
    !entry.is_loaded() && Arc::strong_count(entry) == 1
}

fn is_reclaimable<V>(entry: &Arc<CacheEntry<V>>, now: Instant, ttl: Duration) -> bool {
    entry.is_expired(now, ttl) || is_abandoned(entry)
}

enum Lookup<V> {
    Live(Arc<CacheEntry<V>>),
    /// An invalidated load is still running; it has to settle first.
    Stale(Arc<CacheEntry<V>>),
}

/// Concurrent map from key to a lazily loaded, memoized value.
///
/// - A miss runs the loader once per key, however many callers ask at the
///   same time. A key never has two loads running at once, even across an
///   invalidation.
/// - Entries expire after sitting unread for `expire_after_access`.
/// - With a capacity set, the least recently read entries are evicted early,
///   so a loaded entry may disappear before it expires.
/// - A load whose callers all went away is dropped; its slot is reclaimed by
///   the next sweep or the next caller.
///
/// Keys are spread over shards; a shard lock is only held for map
/// bookkeeping, never while a loader runs.
pub struct LoadingCache<V> {
    shards: Box<[Shard<V>]>,
    hasher: RandomState,
    expire_after_access: Duration,
    shard_capacity: Option<usize>,
    loader: Loader<V>,
}

impl<V> LoadingCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(expire_after_access: Duration, loader: F) -> Self
    where
        F: Fn(&str) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = V> + Send + 'static,
    {
        let loader: Loader<V> = Arc::new(move |key: &str| -> BoxFuture<'static, V> {
            Box::pin(loader(key))
        });

        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            hasher: RandomState::new(),
            expire_after_access,
            shard_capacity: None,
            loader,
        }
    }

    /// Cap the number of stored entries. The cap is split evenly across
    /// shards, rounding up.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.shard_capacity = Some(max_entries.div_ceil(SHARDS).max(1));
        self
    }

    pub fn expire_after_access(&self) -> Duration {
        self.expire_after_access
    }

    /// Return the value for `key`, loading it on a miss.
    pub async fn get(&self, key: &str) -> V {
        loop {
            match self.entry(key) {
                Lookup::Live(entry) => {
                    let value = entry
                        .value
                        .get_or_init(|| (self.loader)(key))
                        .await
                        .clone();
                    // The idle window starts once the value exists.
                    entry.touch(Instant::now());
                    if entry.is_stale() {
                        self.detach(key, &entry);
                    }
                    return value;
                }
                Lookup::Stale(entry) => {
                    entry.value.get_or_init(|| (self.loader)(key)).await;
                    self.detach(key, &entry);
                }
            }
        }
    }

    /// Return the stored value for `key` without loading or touching it.
    #[cfg(test)]
    fn get_if_present(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let shard = self.shard(key).lock();
        shard
            .get(key)
            .filter(|entry| !entry.is_expired(now, self.expire_after_access))
            .and_then(|entry| entry.value.get().cloned())
    }

    /// Drop whatever is stored for `key`; the next `get` reloads.
    ///
    /// Callers already waiting on an in-flight load still receive its
    /// result, but that result is not kept. A `get` arriving afterwards
    /// waits for that load to finish before starting its own.
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.shard(key).lock();
        if let Some(entry) = entries.get(key) {
            if entry.is_loaded() || is_abandoned(entry) {
                entries.remove(key);
            } else {
                entry.mark_stale();
            }
        }
    }

    /// Remove every loaded entry that has been idle past the expiry window,
    /// and every load nobody is waiting for anymore. Returns how many
    /// entries were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.expire_after_access;
        self.shards
            .iter()
            .map(|shard| {
                let mut entries = shard.lock();
                let before = entries.len();
                entries.retain(|_, entry| !is_reclaimable(entry, now, ttl));
                before - entries.len()
            })
            .sum()
    }

    /// Number of stored entries, including in-flight loads.
    pub fn entry_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    fn shard(&self, key: &str) -> &Shard<V> {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }

    // Find or create the slot for `key` and mark it as read.
    fn entry(&self, key: &str) -> Lookup<V> {
        let now = Instant::now();
        let ttl = self.expire_after_access;
        let mut entries = self.shard(key).lock();

        if let Some(entry) = entries.get(key) {
            if !is_reclaimable(entry, now, ttl) {
                if entry.is_stale() {
                    return Lookup::Stale(Arc::clone(entry));
                }
                entry.touch(now);
                return Lookup::Live(Arc::clone(entry));
            }
        }

        if let Some(capacity) = self.shard_capacity {
            self.make_room(&mut entries, key, capacity, now);
        }

        let entry = Arc::new(CacheEntry::new(now));
        entries.insert(key.to_string(), Arc::clone(&entry));
        Lookup::Live(entry)
    }

    // Remove `entry` if it is still the slot stored for `key`.
    fn detach(&self, key: &str, entry: &Arc<CacheEntry<V>>) {
        let mut entries = self.shard(key).lock();
        if entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            entries.remove(key);
        }
    }

    fn make_room(
        &self,
        entries: &mut HashMap<String, Arc<CacheEntry<V>>>,
        key: &str,
        capacity: usize,
        now: Instant,
    ) {
        if entries.len() < capacity || entries.contains_key(key) {
            return;
        }

        let ttl = self.expire_after_access;
        entries.retain(|_, entry| !is_reclaimable(entry, now, ttl));

        while entries.len() >= capacity {
            let victim = entries
                .iter()
                .filter(|(_, entry)| entry.is_loaded())
                .max_by_key(|(_, entry)| entry.idle(now))
                .map(|(k, _)| k.clone());

            match victim {
                Some(victim) => {
                    entries.remove(&victim);
                }
                // Only in-flight loads left; let the shard run over.
                None => break,
            }
        }
    }
}
