//! TTL + LRU cache for handle read results.
//!
//! Entries expire after their TTL and are deleted lazily on access or by the
//! periodic sweep. At capacity, the least recently accessed entry is evicted
//! before inserting. A disabled cache reports every key as absent and passes
//! values through `set` untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use promptvar_core::{CacheConfig, Clock, FileSystemHandle, SystemClock};

/// Deterministic key derived from a handle identity and read options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key for `handle` read with `options`.
    ///
    /// The same handle and options always produce the same key; different
    /// options (encoding, listing depth, ...) produce different keys.
    pub fn for_handle<O: Serialize>(handle: &dyn FileSystemHandle, options: &O) -> Self {
        Self::derive(handle.identity(), &handle.kind().to_string(), options)
    }

    /// Derive a key from raw parts.
    pub fn derive<O: Serialize>(identity: &str, kind: &str, options: &O) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(identity.as_bytes());
        hasher.update(&[0]);
        hasher.update(kind.as_bytes());
        hasher.update(&[0]);
        // Serializing plain option structs cannot fail; an empty fallback
        // still yields a stable key.
        hasher.update(&serde_json::to_vec(options).unwrap_or_default());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// The key as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Running cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a live entry.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries removed to make room.
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
    /// Current number of entries.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Whether caching is enabled.
    pub enabled: bool,
}

impl CacheStats {
    /// Fraction of lookups that hit (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    expiration: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    // Breaks ties between entries touched at the same instant.
    access_seq: u64,
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    next_seq: u64,
    stats: CacheStats,
}

impl<V> CacheInner<V> {
    fn touch(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.last_accessed, e.access_seq))
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&oldest);
        self.stats.evictions += 1;
        Some(oldest)
    }
}

/// Cache of handle read results.
pub struct HandleCache<V> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> fmt::Debug for HandleCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<V: Clone> HandleCache<V> {
    /// Create a cache using the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let stats = CacheStats {
            max_size: config.max_size,
            enabled: config.enabled,
            ..CacheStats::default()
        };
        Self {
            config,
            clock,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                next_seq: 0,
                stats,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Store `value` under `key` and return it.
    ///
    /// `ttl` defaults to the configured TTL.
    pub fn set(&self, key: CacheKey, value: V, ttl: Option<Duration>) -> V {
        if !self.config.enabled {
            return value;
        }

        let now = self.clock.now();
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let expiration = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut inner = self.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.max_size {
            if let Some(evicted) = inner.evict_lru() {
                tracing::debug!(key = %evicted, "evicted least recently used cache entry");
            }
        }

        let access_seq = inner.touch();
        inner.entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                expiration,
                last_accessed: now,
                access_seq,
            },
        );
        inner.stats.size = inner.entries.len();
        value
    }

    /// Look up a live entry.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.config.enabled {
            return None;
        }

        let now = self.clock.now();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let access_seq = inner.touch();

        let expired = match inner.entries.get_mut(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) if entry.expiration < now => true,
            Some(entry) => {
                entry.last_accessed = now;
                entry.access_seq = access_seq;
                let value = entry.value.clone();
                inner.stats.hits += 1;
                return Some(value);
            }
        };

        if expired {
            inner.entries.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            inner.stats.size = inner.entries.len();
        }
        None
    }

    /// Check for a live entry without touching counters or recency.
    pub fn has(&self, key: &CacheKey) -> bool {
        if !self.config.enabled {
            return false;
        }
        let now = self.clock.now();
        self.lock()
            .entries
            .get(key)
            .is_some_and(|e| e.expiration >= now)
    }

    /// Remove an entry; returns whether one was present.
    pub fn delete(&self, key: &CacheKey) -> bool {
        let mut inner = self.lock();
        let removed = inner.entries.remove(key).is_some();
        inner.stats.size = inner.entries.len();
        removed
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.stats.size = 0;
    }

    /// Remove all expired entries regardless of capacity pressure.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.expiration >= now);
        let purged = before - inner.entries.len();
        inner.stats.expirations += purged as u64;
        inner.stats.size = inner.entries.len();
        purged
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Number of stored entries (live or not yet swept).
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + Send + 'static> HandleCache<V> {
    /// Spawn the periodic sweep of expired entries.
    ///
    /// The task runs until `cancel` is triggered.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "swept expired cache entries");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptvar_core::{ListOptions, ManualClock, ReadOptions};

    fn key(name: &str) -> CacheKey {
        CacheKey::derive(name, "file", &ReadOptions::default())
    }

    fn cache(max_size: usize) -> (HandleCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let config = CacheConfig::builder().max_size(max_size).build().unwrap();
        (HandleCache::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn test_key_is_deterministic_per_options() {
        assert_eq!(key("a"), key("a"));
        assert_ne!(key("a"), key("b"));

        let lossy = ReadOptions {
            encoding: promptvar_core::TextEncoding::Utf8Lossy,
            max_bytes: None,
        };
        assert_ne!(key("a"), CacheKey::derive("a", "file", &lossy));
        assert_ne!(
            CacheKey::derive("a", "file", &ListOptions::default()),
            CacheKey::derive("a", "directory", &ListOptions::default())
        );
    }

    #[test]
    fn test_debug_reports_stats() {
        let (cache, _) = cache(4);
        cache.set(key("a"), "A".to_string(), None);
        let shown = format!("{cache:?}");
        assert!(shown.starts_with("HandleCache"));
        assert!(shown.contains("size: 1"));
    }

    #[test]
    fn test_get_hit_and_miss_counters() {
        let (cache, _) = cache(4);
        assert_eq!(cache.get(&key("a")), None);
        cache.set(key("a"), "A".to_string(), None);
        assert_eq!(cache.get(&key("a")).as_deref(), Some("A"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_ttl_expires_after_clock_advance() {
        let (cache, clock) = cache(4);
        cache.set(key("a"), "A".to_string(), Some(Duration::ZERO));
        assert!(cache.has(&key("a")));

        clock.advance(chrono::Duration::milliseconds(1));
        assert_eq!(cache.get(&key("a")), None);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_eviction_removes_oldest_access() {
        let (cache, clock) = cache(3);
        for name in ["a", "b", "c"] {
            cache.set(key(name), name.to_string(), None);
            clock.advance(chrono::Duration::seconds(1));
        }
        // Touch "a"; "b" is now the least recently accessed.
        cache.get(&key("a"));
        cache.set(key("d"), "d".to_string(), None);

        assert!(cache.has(&key("a")));
        assert!(!cache.has(&key("b")));
        assert!(cache.has(&key("c")));
        assert!(cache.has(&key("d")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (cache, _) = cache(1);
        cache.set(key("a"), "1".to_string(), None);
        cache.set(key("a"), "2".to_string(), None);
        assert_eq!(cache.get(&key("a")).as_deref(), Some("2"));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_disabled_cache_is_passthrough() {
        let cache: HandleCache<String> = HandleCache::new(CacheConfig::disabled());
        assert_eq!(cache.set(key("a"), "A".to_string(), None), "A");
        assert_eq!(cache.get(&key("a")), None);
        assert!(!cache.has(&key("a")));
        assert!(cache.is_empty());
        assert!(!cache.stats().enabled);
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache(4);
        cache.set(key("short"), "s".to_string(), Some(Duration::from_secs(1)));
        cache.set(key("long"), "l".to_string(), Some(Duration::from_secs(60)));
        clock.advance(chrono::Duration::seconds(2));

        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.has(&key("long")));
        assert_eq!(cache.stats().size, 1);
    }

    #[test]
    fn test_delete_and_clear() {
        let (cache, _) = cache(4);
        cache.set(key("a"), "A".to_string(), None);
        cache.set(key("b"), "B".to_string(), None);
        assert!(cache.delete(&key("a")));
        assert!(!cache.delete(&key("a")));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_cancel() {
        let cache = Arc::new(HandleCache::<String>::new(CacheConfig::default()));
        let cancel = CancellationToken::new();
        let task = cache.spawn_sweeper(cancel.clone());
        cancel.cancel();
        task.await.unwrap();
    }
}
