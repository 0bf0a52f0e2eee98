//! Configuration module for the edge control plane.

use std::time::Duration;

use serde::Deserialize;

use crate::cache::EvictionStrategy;
use crate::compression::CompressionConfig;
use crate::error::{EdgeError, EdgeResult};
use crate::placement::PlacementAlgorithm;

/// Default health check interval in seconds
pub const DEFAULT_HEALTH_CHECK_INTERVAL: u64 = 30;

/// Default heartbeat timeout in seconds
pub const DEFAULT_HEARTBEAT_TIMEOUT: u64 = 60;

/// Default scheduling interval in seconds
pub const DEFAULT_SCHEDULING_INTERVAL: u64 = 5;

/// Default cache size limit in bytes
pub const DEFAULT_CACHE_MAX_BYTES: usize = 100 * 1024 * 1024;

/// Default cache cleanup interval in seconds
pub const DEFAULT_CACHE_CLEANUP_INTERVAL: u64 = 300;

/// Fraction of the cache limit eviction shrinks down to
pub const DEFAULT_EVICTION_TARGET: f64 = 0.8;

/// Default TTL of optimized responses in seconds
pub const DEFAULT_RESPONSE_TTL: u64 = 300;

/// Heartbeat monitor configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between health checks
    #[serde(with = "serde_duration_secs")]
    pub check_interval: Duration,
    /// Silence after which an Online node goes Offline
    #[serde(with = "serde_duration_secs")]
    pub heartbeat_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL),
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT),
        }
    }
}

/// Workload scheduler configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between scheduling cycles
    #[serde(with = "serde_duration_secs")]
    pub scheduling_interval: Duration,
    /// How a node is chosen among suitable ones
    pub placement: PlacementAlgorithm,
    /// Pending workloads older than this move to Error. `None` retries forever.
    #[serde(with = "serde_opt_duration_secs")]
    pub max_pending_age: Option<Duration>,
    /// Finished workloads older than this are pruned. `None` keeps them.
    #[serde(with = "serde_opt_duration_secs")]
    pub terminal_retention: Option<Duration>,
    /// Executions running longer than this move to Error. `None` waits forever.
    #[serde(with = "serde_opt_duration_secs")]
    pub execution_timeout: Option<Duration>,
    /// Base duration of the built-in simulated executor
    #[serde(rename = "executor_base_duration_ms", with = "serde_duration_millis")]
    pub executor_base_duration: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduling_interval: Duration::from_secs(DEFAULT_SCHEDULING_INTERVAL),
            placement: PlacementAlgorithm::BestAvailable,
            max_pending_age: None,
            terminal_retention: None,
            execution_timeout: None,
            executor_base_duration: Duration::from_secs(1),
        }
    }
}

/// Cache store configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Upper bound on the bytes held by the cache
    pub max_bytes: usize,
    /// Which entries go first when the cache is full
    pub eviction: EvictionStrategy,
    /// Fraction of `max_bytes` that eviction shrinks the cache to
    pub eviction_target: f64,
    /// Interval between cleanup cycles
    #[serde(with = "serde_duration_secs")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_CACHE_MAX_BYTES,
            eviction: EvictionStrategy::Lru,
            eviction_target: DEFAULT_EVICTION_TARGET,
            cleanup_interval: Duration::from_secs(DEFAULT_CACHE_CLEANUP_INTERVAL),
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size limit
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the eviction strategy
    pub fn eviction(mut self, eviction: EvictionStrategy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Bytes eviction shrinks the cache to
    pub fn eviction_target_bytes(&self) -> usize {
        (self.max_bytes as f64 * self.eviction_target) as usize
    }
}

/// Request optimizer configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// TTL given to cached responses
    #[serde(with = "serde_duration_secs")]
    pub default_ttl: Duration,
    /// Whether fetched responses go through the compression codec
    pub compress_responses: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_RESPONSE_TTL),
            compress_responses: true,
        }
    }
}

/// Edge control plane configuration builder
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Heartbeat monitor settings
    pub health: HealthConfig,
    /// Scheduler settings
    pub scheduler: SchedulerConfig,
    /// Cache store settings
    pub cache: CacheConfig,
    /// Compression codec settings
    pub compression: CompressionConfig,
    /// Request optimizer settings
    pub optimizer: OptimizerConfig,
}

impl EdgeConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> EdgeResult<Self> {
        let config: EdgeConfig = serde_json::from_str(json)
            .map_err(|e| EdgeError::ConfigurationError(format!("invalid config document: {}", e)))?;
        config.build()
    }

    /// Set health check interval
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health.check_interval = interval;
        self
    }

    /// Set heartbeat timeout
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.health.heartbeat_timeout = timeout;
        self
    }

    /// Set scheduling interval
    pub fn scheduling_interval(mut self, interval: Duration) -> Self {
        self.scheduler.scheduling_interval = interval;
        self
    }

    /// Set placement algorithm
    pub fn placement(mut self, algorithm: PlacementAlgorithm) -> Self {
        self.scheduler.placement = algorithm;
        self
    }

    /// Expire workloads pending longer than `age`
    pub fn max_pending_age(mut self, age: Duration) -> Self {
        self.scheduler.max_pending_age = Some(age);
        self
    }

    /// Prune finished workloads older than `retention`
    pub fn terminal_retention(mut self, retention: Duration) -> Self {
        self.scheduler.terminal_retention = Some(retention);
        self
    }

    /// Fail executions running longer than `timeout`
    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.scheduler.execution_timeout = Some(timeout);
        self
    }

    /// Set the cache configuration
    pub fn cache_config(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the compression configuration
    pub fn compression_config(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    /// Set the optimizer configuration
    pub fn optimizer_config(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> EdgeResult<Self> {
        if self.health.check_interval.is_zero() {
            return Err(invalid("health check interval must be positive"));
        }
        if self.health.heartbeat_timeout <= self.health.check_interval {
            return Err(invalid(format!(
                "heartbeat timeout ({:?}) must be longer than the health check interval ({:?})",
                self.health.heartbeat_timeout, self.health.check_interval
            )));
        }
        if self.scheduler.scheduling_interval.is_zero() {
            return Err(invalid("scheduling interval must be positive"));
        }
        if self.scheduler.executor_base_duration.is_zero() {
            return Err(invalid("executor base duration must be positive"));
        }
        for (name, value) in [
            ("max pending age", self.scheduler.max_pending_age),
            ("terminal retention", self.scheduler.terminal_retention),
            ("execution timeout", self.scheduler.execution_timeout),
        ] {
            if value.map_or(false, |d| d.is_zero()) {
                return Err(invalid(format!("{} must be positive when set", name)));
            }
        }
        if self.cache.max_bytes == 0 {
            return Err(invalid("cache max_bytes must be positive"));
        }
        if !(self.cache.eviction_target > 0.0 && self.cache.eviction_target <= 1.0) {
            return Err(invalid(format!(
                "cache eviction target {} must be in (0, 1]",
                self.cache.eviction_target
            )));
        }
        if self.cache.cleanup_interval.is_zero() {
            return Err(invalid("cache cleanup interval must be positive"));
        }
        if self.compression.history_limit == 0 {
            return Err(invalid("compression history limit must be positive"));
        }
        if self.optimizer.default_ttl.is_zero() {
            return Err(invalid("optimizer default TTL must be positive"));
        }
        Ok(self)
    }
}

fn invalid(message: impl Into<String>) -> EdgeError {
    EdgeError::ConfigurationError(message.into())
}

/// Serde helper for Duration as seconds.
mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helper for Duration as milliseconds.
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde helper for optional Duration as seconds.
mod serde_opt_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionAlgorithm;

    #[test]
    fn test_default_config() {
        let config = EdgeConfig::default().build().unwrap();
        assert_eq!(config.health.check_interval, Duration::from_secs(30));
        assert_eq!(config.health.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(config.scheduler.scheduling_interval, Duration::from_secs(5));
        assert_eq!(config.cache.eviction, EvictionStrategy::Lru);
        assert_eq!(config.cache.eviction_target_bytes(), 83_886_080);
        assert_eq!(config.compression.min_size_threshold, 1024);
        assert!(config.scheduler.max_pending_age.is_none());
    }

    #[test]
    fn test_timeout_must_exceed_check_interval() {
        let result = EdgeConfig::new()
            .health_check_interval(Duration::from_secs(30))
            .heartbeat_timeout(Duration::from_secs(30))
            .build();
        match result.unwrap_err() {
            EdgeError::ConfigurationError(msg) => assert!(msg.contains("heartbeat timeout")),
            other => panic!("Expected ConfigurationError, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_cache_rejected() {
        let result = EdgeConfig::new()
            .cache_config(CacheConfig::new().max_bytes(0))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_eviction_target_bounds() {
        let mut config = EdgeConfig::new();
        config.cache.eviction_target = 1.5;
        assert!(config.clone().build().is_err());
        config.cache.eviction_target = 0.0;
        assert!(config.build().is_err());
    }

    #[test]
    fn test_zero_optional_bound_rejected() {
        let result = EdgeConfig::new()
            .execution_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json() {
        let config = EdgeConfig::from_json_str(
            r#"{
                "health": { "check_interval": 10, "heartbeat_timeout": 45 },
                "scheduler": { "placement": "first_fit", "max_pending_age": 600 },
                "cache": { "max_bytes": 4096, "eviction": "lfu" },
                "compression": { "algorithm": "Zlib", "min_size_threshold": 2048 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.health.heartbeat_timeout, Duration::from_secs(45));
        assert_eq!(config.scheduler.placement, PlacementAlgorithm::FirstFit);
        assert_eq!(config.scheduler.max_pending_age, Some(Duration::from_secs(600)));
        assert_eq!(config.scheduler.scheduling_interval, Duration::from_secs(5));
        assert_eq!(config.cache.eviction, EvictionStrategy::Lfu);
        assert_eq!(config.compression.algorithm, CompressionAlgorithm::Zlib);
        assert_eq!(config.compression.min_size_threshold, 2048);
    }

    #[test]
    fn test_from_json_validates() {
        let result = EdgeConfig::from_json_str(r#"{ "cache": { "max_bytes": 0 } }"#);
        assert!(matches!(result, Err(EdgeError::ConfigurationError(_))));

        let result = EdgeConfig::from_json_str("not json");
        assert!(matches!(result, Err(EdgeError::ConfigurationError(_))));
    }
}
