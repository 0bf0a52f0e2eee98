//! Request optimizer: cache-first fetching with response compression.

use std::hash::Hasher;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fnv::FnvHasher;
use futures::future::BoxFuture;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cache::CacheStore;
use crate::compression::{CompressionAlgorithm, CompressionEngine};
use crate::config::OptimizerConfig;
use crate::error::EdgeResult;

/// Produces the response for a request the cache cannot answer
#[async_trait]
pub trait RequestFetcher: Send + Sync {
    /// Fetch the response bytes for a request
    async fn fetch(&self, request_key: &str, payload: Option<&serde_json::Value>) -> anyhow::Result<Bytes>;
}

/// Adapts a closure into a fetcher
pub struct FnFetcher<F> {
    func: F,
}

impl<F> FnFetcher<F>
where
    F: Fn(String, Option<serde_json::Value>) -> BoxFuture<'static, anyhow::Result<Bytes>> + Send + Sync,
{
    /// Wrap a closure returning a boxed future
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> RequestFetcher for FnFetcher<F>
where
    F: Fn(String, Option<serde_json::Value>) -> BoxFuture<'static, anyhow::Result<Bytes>> + Send + Sync,
{
    async fn fetch(&self, request_key: &str, payload: Option<&serde_json::Value>) -> anyhow::Result<Bytes> {
        (self.func)(request_key.to_string(), payload.cloned()).await
    }
}

/// Answers every request with a JSON echo of the request, for demos and
/// systems built without a real upstream
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoFetcher;

#[async_trait]
impl RequestFetcher for EchoFetcher {
    async fn fetch(&self, request_key: &str, payload: Option<&serde_json::Value>) -> anyhow::Result<Bytes> {
        let body = serde_json::json!({
            "request": request_key,
            "payload": payload,
        });
        Ok(Bytes::from(serde_json::to_vec(&body)?))
    }
}

/// What the cache holds for one request
#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    algorithm: CompressionAlgorithm,
    original_size: usize,
    data: Vec<u8>,
}

/// Response returned by [`RequestOptimizer::optimize`]
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedResponse {
    /// Cache key derived from the request
    pub cache_key: String,
    /// Whether the response came from the cache
    pub cache_hit: bool,
    /// Response bytes, always uncompressed
    pub data: Bytes,
    /// Time taken to produce the response
    pub response_time: Duration,
    /// Algorithm the response is stored with
    pub algorithm: CompressionAlgorithm,
    /// Size of the response
    pub original_size: usize,
    /// Size of the stored form
    pub stored_size: usize,
    /// `original_size / stored_size`
    pub compression_ratio: f64,
}

/// Request counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerStats {
    /// Requests handled
    pub total_requests: u64,
    /// Requests answered from the cache
    pub cache_hits: u64,
    /// Requests that needed a fetch
    pub cache_misses: u64,
    /// Fetches that failed
    pub fetch_failures: u64,
    /// `cache_hits / total_requests`
    pub hit_ratio: f64,
    /// Mean response time in milliseconds
    pub average_response_time_ms: f64,
    /// Fetched bytes before compression
    pub bytes_before_compression: u64,
    /// Fetched bytes as stored
    pub bytes_after_compression: u64,
    #[serde(skip)]
    total_response_time: Duration,
}

impl OptimizerStats {
    fn record(&mut self, hit: bool, response_time: Duration) {
        self.total_requests += 1;
        if hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
        self.hit_ratio = self.cache_hits as f64 / self.total_requests as f64;
        self.total_response_time += response_time;
        self.average_response_time_ms =
            self.total_response_time.as_secs_f64() * 1000.0 / self.total_requests as f64;
    }

    /// Bytes saved by compressing fetched responses
    pub fn compression_savings(&self) -> u64 {
        self.bytes_before_compression
            .saturating_sub(self.bytes_after_compression)
    }
}

/// Answers requests from the cache, fetching and storing on a miss
pub struct RequestOptimizer {
    config: OptimizerConfig,
    cache: Arc<CacheStore>,
    compression: Arc<CompressionEngine>,
    fetcher: Arc<dyn RequestFetcher>,
    stats: Mutex<OptimizerStats>,
}

impl RequestOptimizer {
    /// Create a new optimizer
    pub fn new(
        config: OptimizerConfig,
        cache: Arc<CacheStore>,
        compression: Arc<CompressionEngine>,
        fetcher: Arc<dyn RequestFetcher>,
    ) -> Self {
        Self {
            config,
            cache,
            compression,
            fetcher,
            stats: Mutex::new(OptimizerStats::default()),
        }
    }

    /// Stable cache key for a request and its payload
    pub fn cache_key(request_key: &str, payload: Option<&serde_json::Value>) -> String {
        let mut hasher = FnvHasher::default();
        hasher.write(request_key.as_bytes());
        if let Some(payload) = payload {
            hasher.write_u8(0);
            hasher.write(payload.to_string().as_bytes());
        }
        format!("req:{:016x}", hasher.finish())
    }

    /// Answer a request from the cache, or fetch, compress and cache it.
    ///
    /// Only a failing fetch is an error.
    pub async fn optimize(
        &self,
        request_key: &str,
        payload: Option<&serde_json::Value>,
    ) -> EdgeResult<OptimizedResponse> {
        let started = Instant::now();
        let cache_key = Self::cache_key(request_key, payload);

        if let Some(response) = self.from_cache(&cache_key, started) {
            self.stats.lock().record(true, response.response_time);
            debug!("Request {} served from cache", request_key);
            return Ok(response);
        }

        let fetched = match self.fetcher.fetch(request_key, payload).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let mut stats = self.stats.lock();
                stats.fetch_failures += 1;
                stats.record(false, started.elapsed());
                return Err(e.into());
            }
        };

        let (algorithm, stored) = if self.config.compress_responses {
            let result = self.compression.compress(&fetched, None);
            (result.algorithm_used, result.data)
        } else {
            (CompressionAlgorithm::None, fetched.clone())
        };
        let envelope = CachedResponse {
            algorithm,
            original_size: fetched.len(),
            data: stored.to_vec(),
        };
        if !self
            .cache
            .set_serialized(cache_key.as_str(), &envelope, Some(self.config.default_ttl))?
        {
            warn!("Response for {} is too large to cache", request_key);
        }

        let response = OptimizedResponse {
            cache_key,
            cache_hit: false,
            original_size: fetched.len(),
            stored_size: stored.len(),
            compression_ratio: ratio(fetched.len(), stored.len()),
            algorithm,
            data: fetched,
            response_time: started.elapsed(),
        };
        let mut stats = self.stats.lock();
        stats.bytes_before_compression += response.original_size as u64;
        stats.bytes_after_compression += response.stored_size as u64;
        stats.record(false, response.response_time);
        Ok(response)
    }

    /// Current counters
    pub fn stats(&self) -> OptimizerStats {
        self.stats.lock().clone()
    }

    fn from_cache(&self, cache_key: &str, started: Instant) -> Option<OptimizedResponse> {
        let envelope: CachedResponse = match self.cache.get_deserialized(cache_key) {
            Ok(found) => found?,
            Err(e) => {
                warn!("Dropping unreadable cache entry {}: {}", cache_key, e);
                self.cache.remove(cache_key);
                return None;
            }
        };
        let data = match self.compression.decompress(&envelope.data, envelope.algorithm) {
            Ok(data) => data,
            Err(e) => {
                warn!("Dropping corrupt cache entry {}: {}", cache_key, e);
                self.cache.remove(cache_key);
                return None;
            }
        };
        Some(OptimizedResponse {
            cache_key: cache_key.to_string(),
            cache_hit: true,
            original_size: envelope.original_size,
            stored_size: envelope.data.len(),
            compression_ratio: ratio(envelope.original_size, envelope.data.len()),
            algorithm: envelope.algorithm,
            data,
            response_time: started.elapsed(),
        })
    }
}

impl std::fmt::Debug for RequestOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptimizer")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn ratio(original: usize, stored: usize) -> f64 {
    if stored == 0 {
        1.0
    } else {
        original as f64 / stored as f64
    }
}
