//! Shared LRU response cache
//!
//! Maps a canonical request key to the full backend response. Bounded by
//! entry count; the least recently used entry is evicted once the capacity
//! is exceeded. Cache keys are computed from `mode:request_hash` where
//! `request_hash` is the SHA-256 digest of the canonical JSON request.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Default number of cached responses
pub const DEFAULT_CAPACITY: usize = 256;

/// Thread-safe, count-bounded LRU response cache
pub struct ResponseCache {
    /// Entries plus recency order, guarded by one lock
    inner: Mutex<LruState>,
    /// Maximum number of entries
    capacity: usize,
    /// Cache statistics
    stats: CacheStats,
}

struct LruState {
    /// key -> (response, last access tick)
    entries: HashMap<String, Slot>,
    /// access tick -> key, oldest first
    recency: BTreeMap<u64, String>,
    /// Monotonic access counter
    tick: u64,
}

struct Slot {
    value: Value,
    tick: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Move `key` to the most-recently-used position
    fn touch(&mut self, key: &str) -> Option<&Value> {
        let tick = self.next_tick();
        let slot = self.entries.get_mut(key)?;
        self.recency.remove(&slot.tick);
        slot.tick = tick;
        self.recency.insert(tick, key.to_string());
        Some(&slot.value)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: AtomicU64,
    /// Lookups that found nothing
    pub misses: AtomicU64,
    /// Responses stored
    pub inserts: AtomicU64,
    /// Entries dropped to stay within capacity
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Get current cache hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get current cache miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0-1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl ResponseCache {
    /// Create an empty cache holding at most `capacity` responses
    ///
    /// A capacity of 0 retains nothing: every insert is evicted at once.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruState {
                entries: HashMap::with_capacity(capacity.min(4096)),
                recency: BTreeMap::new(),
                tick: 0,
            }),
            capacity,
            stats: CacheStats::default(),
        }
    }

    /// Look up a response, promoting it to most-recently-used on hit
    pub fn get(&self, key: &str) -> Option<Value> {
        let hit = self.inner.lock().touch(key).cloned();
        match hit {
            Some(_) => self.stats.hits.fetch_add(1, Ordering::Relaxed),
            None => self.stats.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    /// Insert or overwrite a response as most-recently-used
    ///
    /// Evicts least-recently-used entries while over capacity.
    pub fn put(&self, key: &str, value: Value) {
        let evicted = {
            let mut state = self.inner.lock();
            let tick = state.next_tick();
            if let Some(old) = state.entries.insert(key.to_string(), Slot { value, tick }) {
                state.recency.remove(&old.tick);
            }
            state.recency.insert(tick, key.to_string());

            let mut evicted = 0u64;
            while state.entries.len() > self.capacity {
                if state.evict_oldest().is_none() {
                    break;
                }
                evicted += 1;
            }
            evicted
        };

        self.stats.inserts.fetch_add(1, Ordering::Relaxed);
        if evicted > 0 {
            self.stats.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    /// Whether `key` is cached, without touching recency or stats
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Number of cached responses
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            inserts: self.stats.inserts.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size: self.len(),
            capacity: self.capacity,
            hit_rate: self.stats.hit_rate(),
        }
    }

    /// Build a cache key from a parsed request
    ///
    /// The key format is `{mode}:{request_hash}`. Two requests with the same
    /// content in any key order share a key. Every field takes part,
    /// `options.cache` included.
    #[must_use]
    pub fn build_key(request: &Value) -> String {
        let mode = request.get("mode").and_then(Value::as_str).unwrap_or("-");
        let mut hasher = Sha256::new();
        hasher.update(canonical_json(request).as_bytes());
        let result = hasher.finalize();
        format!("{mode}:{result:x}")
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Serialize with object keys sorted at every level
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total inserts
    pub inserts: u64,
    /// Total evictions
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    /// Configured capacity
    pub capacity: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_cache_hit() {
        let cache = ResponseCache::new(4);
        let value = json!({"ok": true, "result": 4.0});

        cache.put("k", value.clone());

        assert_eq!(cache.get("k"), Some(value));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_cache_miss() {
        let cache = ResponseCache::new(4);

        assert_eq!(cache.get("nonexistent"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_evicts_least_recently_inserted() {
        let cache = ResponseCache::new(3);
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.put(key, json!(i));
        }

        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_get_protects_from_eviction() {
        let cache = ResponseCache::new(3);
        cache.put("a", json!(1));
        cache.put("b", json!(2));
        cache.put("c", json!(3));

        assert_eq!(cache.get("a"), Some(json!(1)));
        cache.put("d", json!(4));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_put_overwrites_and_promotes() {
        let cache = ResponseCache::new(2);
        cache.put("a", json!(1));
        cache.put("b", json!(2));
        cache.put("a", json!(10));
        cache.put("c", json!(3));

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("b"));
        assert_eq!(cache.get("a"), Some(json!(10)));
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let cache = ResponseCache::new(0);
        cache.put("a", json!(1));

        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_build_key_ignores_field_order() {
        let first: Value = serde_json::from_str(
            r#"{"mode":"calc","data":{"expr":"2+2"},"options":{"cache":true}}"#,
        )
        .unwrap();
        let second: Value = serde_json::from_str(
            r#"{"options":{"cache":true},"data":{"expr":"2+2"},"mode":"calc"}"#,
        )
        .unwrap();

        let key = ResponseCache::build_key(&first);
        assert_eq!(key, ResponseCache::build_key(&second));
        assert!(key.starts_with("calc:"));
        assert_eq!(key.len(), "calc:".len() + 64);
    }

    #[test]
    fn test_build_key_includes_cache_option() {
        let cached = json!({"mode": "calc", "data": {"expr": "1"}, "options": {"cache": true}});
        let uncached = json!({"mode": "calc", "data": {"expr": "1"}, "options": {"cache": false}});

        assert_ne!(
            ResponseCache::build_key(&cached),
            ResponseCache::build_key(&uncached)
        );
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": [{"z": 1, "y": 2}], "a": {"d": null, "c": "x"}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":"x","d":null},"b":[{"y":2,"z":1}]}"#
        );
    }

    #[test]
    fn test_hit_rate() {
        let cache = ResponseCache::new(8);
        cache.put("key1", json!(1));
        cache.put("key2", json!(2));

        cache.get("key1");
        cache.get("key2");
        cache.get("key3");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 2);
        assert!((stats.hit_rate - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_concurrent_access_stays_bounded() {
        let cache = Arc::new(ResponseCache::new(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("{t}-{}", i % 32);
                        if cache.get(&key).is_none() {
                            cache.put(&key, json!(i));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.size, 16);
        assert_eq!(stats.hits + stats.misses, 8 * 200);
        assert_eq!(stats.inserts - stats.evictions, 16);
    }
}
