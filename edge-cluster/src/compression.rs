//! Compression codec for cached payloads and responses.
//!
//! Payloads smaller than the configured threshold are passed through
//! untouched. Larger ones go through one of the deflate-family algorithms;
//! if the algorithm fails or does not shrink the payload, the codec falls
//! back to passing it through, so callers can always decompress with the
//! algorithm reported in the result.

use std::collections::VecDeque;
use std::fmt;
use std::io::Read;
use std::time::{Duration, Instant};

use bytes::Bytes;
use flate2::read::{DeflateDecoder, DeflateEncoder, GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{EdgeError, EdgeResult};

/// Default minimum payload size for compression, in bytes
pub const DEFAULT_MIN_SIZE_THRESHOLD: usize = 1024;

/// Default number of compression records kept
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Compression level for payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    /// Fast compression (less CPU, larger size)
    Fast,
    /// Default compression (balanced)
    Default,
    /// Best compression (more CPU, smaller size)
    Best,
}

impl Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel::Default
    }
}

impl CompressionLevel {
    /// Convert to flate2 Compression level
    pub fn to_flate2_level(&self) -> Compression {
        match self {
            CompressionLevel::Fast => Compression::fast(),
            CompressionLevel::Default => Compression::default(),
            CompressionLevel::Best => Compression::best(),
        }
    }
}

/// Compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// Payload stored as is
    None,
    /// Gzip framing around deflate
    Gzip,
    /// Zlib framing around deflate
    Zlib,
    /// Raw deflate stream
    Deflate,
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        CompressionAlgorithm::Gzip
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Zlib => "zlib",
            CompressionAlgorithm::Deflate => "deflate",
        };
        f.write_str(name)
    }
}

/// Configuration for compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Whether compression is enabled
    pub enabled: bool,
    /// Algorithm used when the caller does not pick one
    pub algorithm: CompressionAlgorithm,
    /// Compression level
    pub level: CompressionLevel,
    /// Minimum payload size for compression (in bytes)
    pub min_size_threshold: usize,
    /// Number of compression records kept for inspection
    pub history_limit: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: CompressionAlgorithm::Gzip,
            level: CompressionLevel::Default,
            min_size_threshold: DEFAULT_MIN_SIZE_THRESHOLD,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl CompressionConfig {
    /// Create a new compression configuration
    pub fn new(
        enabled: bool,
        algorithm: CompressionAlgorithm,
        level: CompressionLevel,
        min_size_threshold: usize,
    ) -> Self {
        Self {
            enabled,
            algorithm,
            level,
            min_size_threshold,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Check if a payload should be compressed based on its size
    pub fn should_compress(&self, data_size: usize) -> bool {
        self.enabled && data_size >= self.min_size_threshold
    }
}

/// Compress data with the given algorithm and level
pub fn compress(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    level: CompressionLevel,
) -> EdgeResult<Vec<u8>> {
    let level = level.to_flate2_level();
    let mut compressed = Vec::new();
    let read = match algorithm {
        CompressionAlgorithm::None => return Ok(data.to_vec()),
        CompressionAlgorithm::Gzip => GzEncoder::new(data, level).read_to_end(&mut compressed),
        CompressionAlgorithm::Zlib => ZlibEncoder::new(data, level).read_to_end(&mut compressed),
        CompressionAlgorithm::Deflate => {
            DeflateEncoder::new(data, level).read_to_end(&mut compressed)
        }
    };
    read.map_err(|e| EdgeError::CompressionError(format!("{}: {}", algorithm, e)))?;
    Ok(compressed)
}

/// Decompress data produced by [`compress`] with the same algorithm
pub fn decompress(data: &[u8], algorithm: CompressionAlgorithm) -> EdgeResult<Vec<u8>> {
    let mut decompressed = Vec::new();
    let read = match algorithm {
        CompressionAlgorithm::None => return Ok(data.to_vec()),
        CompressionAlgorithm::Gzip => GzDecoder::new(data).read_to_end(&mut decompressed),
        CompressionAlgorithm::Zlib => ZlibDecoder::new(data).read_to_end(&mut decompressed),
        CompressionAlgorithm::Deflate => DeflateDecoder::new(data).read_to_end(&mut decompressed),
    };
    read.map_err(|e| EdgeError::DecompressionError(format!("{}: {}", algorithm, e)))?;
    Ok(decompressed)
}

/// Outcome of compressing one payload
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    /// Input size in bytes
    pub original_size: usize,
    /// Output size in bytes
    pub compressed_size: usize,
    /// `original_size / compressed_size`, 1.0 when nothing was done
    pub ratio: f64,
    /// Algorithm to pass to `decompress`
    pub algorithm_used: CompressionAlgorithm,
    /// Output bytes
    pub data: Bytes,
    /// Time spent compressing
    pub duration: Duration,
}

/// One entry of the compression history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionRecord {
    /// Input size in bytes
    pub original_size: usize,
    /// Output size in bytes
    pub compressed_size: usize,
    /// Algorithm that produced the output
    pub algorithm: CompressionAlgorithm,
    /// Compression ratio
    pub ratio: f64,
    /// Time spent, in microseconds
    pub duration_us: u64,
}

/// Compression statistics for monitoring and debugging
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Total number of payloads processed
    pub total_operations: u64,
    /// Number of payloads that were compressed
    pub compressed: u64,
    /// Number of payloads not compressed due to the size threshold
    pub skipped_small: u64,
    /// Number of payloads not compressed because compression did not help
    pub skipped_ineffective: u64,
    /// Number of payloads passed through after the algorithm failed
    pub fallbacks: u64,
    /// Total bytes before compression
    pub total_bytes_before: u64,
    /// Total bytes after compression
    pub total_bytes_after: u64,
    /// Best ratio achieved
    pub max_ratio: f64,
    /// Mean time per operation, in microseconds
    pub average_time_us: f64,
    #[serde(skip)]
    total_time: Duration,
}

impl CompressionStats {
    fn update(&mut self, result: &CompressionResult) {
        self.total_operations += 1;
        self.total_bytes_before += result.original_size as u64;
        self.total_bytes_after += result.compressed_size as u64;
        if result.algorithm_used != CompressionAlgorithm::None {
            self.compressed += 1;
            if result.ratio > self.max_ratio {
                self.max_ratio = result.ratio;
            }
        }
        self.total_time += result.duration;
        self.average_time_us = self.total_time.as_micros() as f64 / self.total_operations as f64;
    }

    /// Overall `bytes before / bytes after`
    pub fn compression_ratio(&self) -> f64 {
        if self.total_bytes_after == 0 {
            return 1.0;
        }
        self.total_bytes_before as f64 / self.total_bytes_after as f64
    }

    /// Bytes saved by compression
    pub fn bytes_saved(&self) -> u64 {
        self.total_bytes_before.saturating_sub(self.total_bytes_after)
    }

    /// Get the percentage of payloads that were compressed
    pub fn compression_percentage(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        100.0 * (self.compressed as f64 / self.total_operations as f64)
    }
}

#[derive(Debug, Default)]
struct EngineState {
    history: VecDeque<CompressionRecord>,
    stats: CompressionStats,
}

/// Threshold-aware codec with statistics and a bounded history
#[derive(Debug)]
pub struct CompressionEngine {
    config: CompressionConfig,
    state: Mutex<EngineState>,
}

impl CompressionEngine {
    /// Create a new engine
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            config,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Compress a payload with `algorithm`, or the configured default.
    ///
    /// Never fails: payloads below the threshold, and payloads the algorithm
    /// cannot handle or shrink, come back unchanged with algorithm `None`.
    pub fn compress(&self, data: &[u8], algorithm: Option<CompressionAlgorithm>) -> CompressionResult {
        let algorithm = algorithm.unwrap_or(self.config.algorithm);
        let started = Instant::now();
        let original_size = data.len();

        let mut skipped_small = false;
        let mut skipped_ineffective = false;
        let mut fell_back = false;
        let output = if !self.config.should_compress(original_size) {
            skipped_small = true;
            None
        } else if algorithm == CompressionAlgorithm::None {
            None
        } else {
            match compress(data, algorithm, self.config.level) {
                Ok(compressed) if compressed.len() < original_size => Some(compressed),
                Ok(_) => {
                    skipped_ineffective = true;
                    None
                }
                Err(e) => {
                    warn!("Compression failed, storing payload uncompressed: {}", e);
                    fell_back = true;
                    None
                }
            }
        };

        let result = match output {
            Some(compressed) => CompressionResult {
                original_size,
                compressed_size: compressed.len(),
                ratio: ratio(original_size, compressed.len()),
                algorithm_used: algorithm,
                data: Bytes::from(compressed),
                duration: started.elapsed(),
            },
            None => CompressionResult {
                original_size,
                compressed_size: original_size,
                ratio: 1.0,
                algorithm_used: CompressionAlgorithm::None,
                data: Bytes::copy_from_slice(data),
                duration: started.elapsed(),
            },
        };

        let mut state = self.state.lock();
        state.stats.update(&result);
        if skipped_small {
            state.stats.skipped_small += 1;
        }
        if skipped_ineffective {
            state.stats.skipped_ineffective += 1;
        }
        if fell_back {
            state.stats.fallbacks += 1;
        }
        if state.history.len() >= self.config.history_limit {
            state.history.pop_front();
        }
        state.history.push_back(CompressionRecord {
            original_size: result.original_size,
            compressed_size: result.compressed_size,
            algorithm: result.algorithm_used,
            ratio: result.ratio,
            duration_us: result.duration.as_micros() as u64,
        });
        drop(state);

        debug!(
            "Compressed {} bytes to {} with {}",
            result.original_size, result.compressed_size, result.algorithm_used
        );
        result
    }

    /// Exact inverse of [`CompressionEngine::compress`]
    pub fn decompress(&self, data: &[u8], algorithm: CompressionAlgorithm) -> EdgeResult<Bytes> {
        decompress(data, algorithm).map(Bytes::from)
    }

    /// Most recent compression records, oldest first
    pub fn history(&self) -> Vec<CompressionRecord> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Current statistics
    pub fn stats(&self) -> CompressionStats {
        self.state.lock().stats.clone()
    }
}

impl Default for CompressionEngine {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}

fn ratio(original: usize, compressed: usize) -> f64 {
    if compressed == 0 {
        return 1.0;
    }
    original as f64 / compressed as f64
}
