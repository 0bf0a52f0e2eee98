//! Size-bounded key/value cache
//!
//! Entries carry an optional TTL counted from insertion. When an insert would
//! push the cache past its limit, entries are evicted by the configured
//! [`EvictionPolicy`] until the cache is down to its eviction target.

mod entry;
mod eviction;

pub use entry::CacheEntry;
pub use eviction::{EvictionPolicy, EvictionStrategy, Fifo, Lfu, Lru};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::CacheConfig;
use crate::error::{EdgeError, EdgeResult};

/// Cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 before the first lookup
    pub hit_ratio: f64,
    /// Bytes served from the cache
    pub bytes_saved: u64,
    /// Entries removed to make room
    pub evictions: u64,
    /// Entries removed because their TTL ran out
    pub expirations: u64,
    /// Inserts refused because the entry alone exceeds the limit
    pub rejected: u64,
    /// Live entries
    pub entries: usize,
    /// Bytes held
    pub total_bytes: usize,
}

/// What a cleanup pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Expired entries dropped
    pub expired: usize,
    /// Entries evicted to enforce the size bound
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    total_bytes: usize,
    next_seq: u64,
    stats: CacheStats,
}

impl CacheState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.size_bytes();
        Some(entry)
    }

    /// Drop every entry expired at `now`, counting them as expirations
    fn drop_expired(&mut self, now: Instant) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key().to_string())
            .collect();
        for key in &expired_keys {
            self.remove(key);
        }
        self.stats.expirations += expired_keys.len() as u64;
        expired_keys.len()
    }
}

/// Shared cache store
#[derive(Debug)]
pub struct CacheStore {
    config: CacheConfig,
    policy: Box<dyn EvictionPolicy>,
    state: Mutex<CacheState>,
}

impl CacheStore {
    /// Create an empty cache
    pub fn new(config: CacheConfig) -> Self {
        let policy = config.eviction.policy();
        Self {
            config,
            policy,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Size limit in bytes
    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes
    }

    /// Look a key up. An expired entry is dropped and counts as a miss.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired = match state.entries.get(key) {
            None => {
                state.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            state.remove(key);
            state.stats.expirations += 1;
            state.stats.misses += 1;
            debug!("Cache entry {} expired", key);
            return None;
        }

        let seq = state.next_seq();
        let entry = state.entries.get_mut(key)?;
        entry.touch(now, seq);
        let value = entry.value().clone();
        state.stats.hits += 1;
        state.stats.bytes_saved += value.len() as u64;
        Some(value)
    }

    /// Store a value, replacing any entry under the same key.
    ///
    /// Returns false, storing nothing, when the value alone is larger than
    /// the cache.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Bytes>, ttl: Option<Duration>) -> bool {
        let key = key.into();
        let value = value.into();
        let size = value.len();
        let max = self.config.max_bytes;

        let mut state = self.state.lock();
        if size > max {
            state.stats.rejected += 1;
            warn!(
                "Refusing to cache {}: {}",
                key,
                EdgeError::CacheOverflow { size, max }
            );
            return false;
        }

        state.remove(&key);
        if state.total_bytes + size > max {
            state.drop_expired(Instant::now());
        }
        if state.total_bytes + size > max {
            let target = self.config.eviction_target_bytes().min(max - size);
            self.evict_to(&mut state, target);
        }

        let seq = state.next_seq();
        state.total_bytes += size;
        state.entries.insert(key.clone(), CacheEntry::new(key, value, ttl, seq));
        true
    }

    /// Serialize a value with bincode and store it
    pub fn set_serialized<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
        ttl: Option<Duration>,
    ) -> EdgeResult<bool> {
        let bytes = bincode::serialize(value)?;
        Ok(self.set(key, bytes, ttl))
    }

    /// Look a key up and deserialize it with bincode
    pub fn get_deserialized<T: DeserializeOwned>(&self, key: &str) -> EdgeResult<Option<T>> {
        match self.get(key) {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Check for a live entry without touching it
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .get(key)
            .map_or(false, |entry| !entry.is_expired(now))
    }

    /// Copy of an entry, without touching it
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Remove an entry
    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_bytes = 0;
    }

    /// Number of stored entries, expired ones included until cleanup
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Bytes held
    pub fn total_bytes(&self) -> usize {
        self.state.lock().total_bytes
    }

    /// All keys, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        let lookups = stats.hits + stats.misses;
        stats.hit_ratio = if lookups == 0 {
            0.0
        } else {
            stats.hits as f64 / lookups as f64
        };
        stats.entries = state.entries.len();
        stats.total_bytes = state.total_bytes;
        stats
    }

    /// Drop expired entries, then evict down to the target if the cache is
    /// over its limit.
    pub fn cleanup(&self) -> CleanupReport {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired = state.drop_expired(now);

        let evicted = if state.total_bytes > self.config.max_bytes {
            self.evict_to(&mut state, self.config.eviction_target_bytes())
        } else {
            0
        };

        let report = CleanupReport {
            expired,
            evicted,
        };
        if report.expired > 0 || report.evicted > 0 {
            debug!(
                "Cache cleanup dropped {} expired and {} evicted entries",
                report.expired, report.evicted
            );
        }
        report
    }

    /// Clean up every `cleanup_interval` until `shutdown` flips to true
    pub async fn run_cleanup(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Cache cleanup started ({} eviction, every {:?})",
            self.policy.name(),
            self.config.cleanup_interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cleanup();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Cache cleanup stopped");
    }

    fn evict_to(&self, state: &mut CacheState, target: usize) -> usize {
        if state.total_bytes <= target {
            return 0;
        }
        let victims: Vec<String> = {
            let mut order: Vec<&CacheEntry> = state.entries.values().collect();
            order.sort_by(|a, b| self.policy.compare(a, b));
            let mut remaining = state.total_bytes;
            order
                .into_iter()
                .take_while(|entry| {
                    let over = remaining > target;
                    remaining -= entry.size_bytes();
                    over
                })
                .map(|entry| entry.key().to_string())
                .collect()
        };
        for key in &victims {
            state.remove(key);
        }
        state.stats.evictions += victims.len() as u64;
        debug!(
            "Evicted {} cache entries ({}), {} bytes left",
            victims.len(),
            self.policy.name(),
            state.total_bytes
        );
        victims.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        value: i32,
    }

    fn store(max_bytes: usize, eviction: EvictionStrategy) -> CacheStore {
        CacheStore::new(CacheConfig::new().max_bytes(max_bytes).eviction(eviction))
    }

    #[tokio::test]
    async fn test_set_get_and_stats() {
        let cache = store(1024, EvictionStrategy::Lru);
        assert!(cache.set("k", &b"hello"[..], None));
        assert_eq!(cache.get("k"), Some(Bytes::from_static(b"hello")));
        assert_eq!(cache.get("missing"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio, 0.5);
        assert_eq!(stats.bytes_saved, 5);
        assert_eq!(stats.total_bytes, 5);
        assert_eq!(cache.peek("k").unwrap().access_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_tracks_size() {
        let cache = store(1024, EvictionStrategy::Lru);
        cache.set("k", vec![0u8; 100], None);
        cache.set("k", vec![0u8; 30], None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 30);
    }

    #[tokio::test]
    async fn test_oversize_entry_rejected() {
        let cache = store(10, EvictionStrategy::Lru);
        cache.set("small", vec![1u8; 4], None);
        assert!(!cache.set("big", vec![0u8; 11], None));
        assert!(!cache.contains("big"));
        assert!(cache.contains("small"));
        assert_eq!(cache.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_insert_evicts_down_to_target() {
        let cache = store(100, EvictionStrategy::Fifo);
        for key in ["a", "b", "c", "d", "e"] {
            assert!(cache.set(key, vec![0u8; 20], None));
        }
        assert_eq!(cache.total_bytes(), 100);

        // 100 + 20 > 100: shrink to 80 first, then insert
        assert!(cache.set("f", vec![0u8; 20], None));
        assert!(!cache.contains("a"));
        assert!(cache.contains("f"));
        assert_eq!(cache.total_bytes(), 100);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_large_insert_evicts_past_target() {
        let cache = store(100, EvictionStrategy::Fifo);
        for key in ["a", "b", "c", "d"] {
            cache.set(key, vec![0u8; 20], None);
        }
        assert!(cache.set("big", vec![0u8; 70], None));
        assert!(cache.total_bytes() <= 100);
        assert!(cache.contains("big"));
        assert!(cache.contains("d"));
        assert!(!cache.contains("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = store(1024, EvictionStrategy::Lru);
        cache.set("short", &b"x"[..], Some(Duration::from_secs(5)));
        cache.set("forever", &b"y"[..], None);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get("short").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("short").is_none());
        assert!(cache.get("forever").is_some());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_drops_expired_before_evicting() {
        let cache = store(100, EvictionStrategy::Lfu);
        cache.set("stale", vec![0u8; 40], Some(Duration::from_secs(10)));
        for _ in 0..5 {
            cache.get("stale");
        }
        cache.set("live", vec![0u8; 40], None);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.set("incoming", vec![0u8; 40], None));

        assert!(cache.peek("stale").is_none());
        assert!(cache.contains("live"));
        assert!(cache.contains("incoming"));
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.total_bytes, 80);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_drops_expired() {
        let cache = store(1024, EvictionStrategy::Lru);
        cache.set("a", &b"1"[..], Some(Duration::from_secs(1)));
        cache.set("b", &b"2"[..], Some(Duration::from_secs(100)));

        tokio::time::advance(Duration::from_secs(10)).await;
        let report = cache.cleanup();
        assert_eq!(report, CleanupReport { expired: 1, evicted: 0 });
        assert_eq!(cache.keys(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_serialized_round_trip() {
        let cache = store(1024, EvictionStrategy::Lru);
        let reading = Reading {
            sensor: "temp-1".to_string(),
            value: 21,
        };
        assert!(cache.set_serialized("reading", &reading, None).unwrap());
        let back: Option<Reading> = cache.get_deserialized("reading").unwrap();
        assert_eq!(back, Some(reading));

        cache.set("garbage", &b"\x01"[..], None);
        let result: EdgeResult<Option<Reading>> = cache.get_deserialized("garbage");
        assert!(matches!(result, Err(EdgeError::SerializationError(_))));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = store(1024, EvictionStrategy::Lfu);
        cache.set("a", &b"1"[..], None);
        cache.set("b", &b"2"[..], None);
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }
}
