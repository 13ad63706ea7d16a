//! Response cache with explicit invalidation.
//!
//! Entries are keyed by operation name and parameters. Each operation has its
//! own time to live; handlers that change an order invalidate its entries
//! once their transaction has committed.
//!
//! A read that misses captures the cache [`Generation`] before loading from
//! the store and stores its result with [`ResponseCache::insert_if_current`].
//! Any invalidation in between bumps the generation, so a value loaded before
//! a committed change is never stored after that change was invalidated.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    operation: &'static str,
    params: String,
}

impl CacheKey {
    fn new(operation: &'static str, params: &str) -> Self {
        Self {
            operation,
            params: params.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

#[derive(Debug)]
struct Entries<V> {
    map: HashMap<CacheKey, Entry<V>>,
    generation: u64,
}

/// Snapshot of the invalidation counter taken before a store read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

/// In-process cache of read responses.
#[derive(Debug)]
pub struct ResponseCache<V> {
    entries: RwLock<Entries<V>>,
    ttls: HashMap<&'static str, Duration>,
    default_ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    /// Creates an empty cache whose operations live for `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(Entries {
                map: HashMap::new(),
                generation: 0,
            }),
            ttls: HashMap::new(),
            default_ttl,
        }
    }

    /// Overrides the time to live of one operation.
    pub fn with_ttl(mut self, operation: &'static str, ttl: Duration) -> Self {
        self.ttls.insert(operation, ttl);
        self
    }

    fn ttl_of(&self, operation: &str) -> Duration {
        self.ttls.get(operation).copied().unwrap_or(self.default_ttl)
    }

    fn is_live(&self, key: &CacheKey, entry: &Entry<V>) -> bool {
        entry.stored_at.elapsed() < self.ttl_of(key.operation)
    }

    /// Returns a live entry. An expired entry is evicted.
    pub async fn get(&self, operation: &'static str, params: &str) -> Option<V> {
        let key = CacheKey::new(operation, params);

        let (hit, stale) = {
            let entries = self.entries.read().await;
            match entries.map.get(&key) {
                Some(entry) if self.is_live(&key, entry) => (Some(entry.value.clone()), false),
                Some(_) => (None, true),
                None => (None, false),
            }
        };

        if stale {
            let mut entries = self.entries.write().await;
            // Another task may have refreshed it since the read lock was released.
            let expired = entries
                .map
                .get(&key)
                .is_some_and(|entry| !self.is_live(&key, entry));
            if expired {
                entries.map.remove(&key);
            }
        }

        let outcome = if hit.is_some() { "hit" } else { "miss" };
        metrics::counter!("api_cache_lookups_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        hit
    }

    /// Returns the current generation. Take it before reading the value to
    /// cache.
    pub async fn generation(&self) -> Generation {
        Generation(self.entries.read().await.generation)
    }

    /// Stores an entry unless the cache was invalidated since `seen`.
    ///
    /// Returns whether the value was stored.
    pub async fn insert_if_current(
        &self,
        operation: &'static str,
        params: &str,
        value: V,
        seen: Generation,
    ) -> bool {
        let mut entries = self.entries.write().await;
        if entries.generation != seen.0 {
            tracing::debug!(operation, params, "cache fill skipped, invalidated during read");
            return false;
        }
        entries.map.insert(
            CacheKey::new(operation, params),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
        true
    }

    /// Drops an entry and fences out fills that started before this call.
    pub async fn invalidate(&self, operation: &'static str, params: &str) {
        let mut entries = self.entries.write().await;
        entries.generation = entries.generation.wrapping_add(1);
        if entries.map.remove(&CacheKey::new(operation, params)).is_some() {
            tracing::debug!(operation, params, "cache entry invalidated");
        }
    }

    /// Drops every expired entry.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.map.len();
        entries.map.retain(|key, entry| self.is_live(key, entry));
        before - entries.map.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }
}

impl<V: Clone + Send + Sync + 'static> ResponseCache<V> {
    /// Purges expired entries every `every` until the cache is dropped.
    pub fn spawn_purger(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else { break };
                let purged = cache.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "expired cache entries purged");
                }
            }
        })
    }
}
