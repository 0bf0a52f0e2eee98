use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

/// A cached value with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: String,
    value: Bytes,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
    ttl: Option<Duration>,
    pub(crate) inserted_seq: u64,
    pub(crate) accessed_seq: u64,
}

impl CacheEntry {
    pub(crate) fn new(key: String, value: Bytes, ttl: Option<Duration>, seq: u64) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl,
            inserted_seq: seq,
            accessed_seq: seq,
        }
    }

    /// Cache key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stored bytes
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Size of the stored value in bytes
    pub fn size_bytes(&self) -> usize {
        self.value.len()
    }

    /// Insertion time
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time of the last hit, or insertion time
    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    /// Number of hits
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Time to live, counted from insertion
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// An entry without TTL never expires
    pub fn is_expired(&self, now: Instant) -> bool {
        self.ttl
            .map_or(false, |ttl| now.saturating_duration_since(self.created_at) >= ttl)
    }

    pub(crate) fn touch(&mut self, now: Instant, seq: u64) {
        self.last_accessed = now;
        self.accessed_seq = seq;
        self.access_count += 1;
    }
}
