//! Eviction policies deciding which cache entries go first

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::entry::CacheEntry;

/// Orders entries for eviction
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    /// Short policy name, used in logs
    fn name(&self) -> &'static str;

    /// `Ordering::Less` when `a` should be evicted before `b`
    fn compare(&self, a: &CacheEntry, b: &CacheEntry) -> Ordering;
}

/// Least recently used entries go first
#[derive(Debug, Clone, Copy, Default)]
pub struct Lru;

impl EvictionPolicy for Lru {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn compare(&self, a: &CacheEntry, b: &CacheEntry) -> Ordering {
        (a.last_accessed(), a.accessed_seq).cmp(&(b.last_accessed(), b.accessed_seq))
    }
}

/// Least frequently used entries go first, least recent among equals
#[derive(Debug, Clone, Copy, Default)]
pub struct Lfu;

impl EvictionPolicy for Lfu {
    fn name(&self) -> &'static str {
        "lfu"
    }

    fn compare(&self, a: &CacheEntry, b: &CacheEntry) -> Ordering {
        (a.access_count(), a.last_accessed(), a.accessed_seq).cmp(&(
            b.access_count(),
            b.last_accessed(),
            b.accessed_seq,
        ))
    }
}

/// Oldest inserted entries go first
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifo;

impl EvictionPolicy for Fifo {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn compare(&self, a: &CacheEntry, b: &CacheEntry) -> Ordering {
        (a.created_at(), a.inserted_seq).cmp(&(b.created_at(), b.inserted_seq))
    }
}

/// Eviction strategy selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Least recently used
    Lru,
    /// Least frequently used
    Lfu,
    /// First in, first out
    Fifo,
}

impl Default for EvictionStrategy {
    fn default() -> Self {
        EvictionStrategy::Lru
    }
}

impl EvictionStrategy {
    /// Build the policy object for this strategy
    pub fn policy(self) -> Box<dyn EvictionPolicy> {
        match self {
            EvictionStrategy::Lru => Box::new(Lru),
            EvictionStrategy::Lfu => Box::new(Lfu),
            EvictionStrategy::Fifo => Box::new(Fifo),
        }
    }
}
