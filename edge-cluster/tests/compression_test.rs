// Tests for the compression codec: round trips, thresholds and fallbacks

mod common;

use edge_cluster::compression::{self, CompressionLevel};
use edge_cluster::{CompressionAlgorithm, CompressionConfig, CompressionEngine, EdgeError};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};

const ALGORITHMS: [CompressionAlgorithm; 4] = [
    CompressionAlgorithm::None,
    CompressionAlgorithm::Gzip,
    CompressionAlgorithm::Zlib,
    CompressionAlgorithm::Deflate,
];

fn engine(min_size_threshold: usize) -> CompressionEngine {
    common::init_logging();
    CompressionEngine::new(CompressionConfig::new(
        true,
        CompressionAlgorithm::Gzip,
        CompressionLevel::Default,
        min_size_threshold,
    ))
}

fn log_lines(count: usize) -> Vec<u8> {
    (0..count)
        .map(|i| format!("2024-01-01T00:00:{:02}Z sensor-{} reading=42.0 status=ok\n", i % 60, i % 8))
        .collect::<String>()
        .into_bytes()
}

#[test]
fn test_text_shrinks_with_every_algorithm() {
    let codec = engine(1024);
    let data = log_lines(200);
    for algorithm in &ALGORITHMS[1..] {
        let result = codec.compress(&data, Some(*algorithm));
        assert_eq!(result.algorithm_used, *algorithm);
        assert!(result.compressed_size < result.original_size);
        assert!(result.ratio > 1.0);
        assert_eq!(&codec.decompress(&result.data, *algorithm).unwrap()[..], &data[..]);
    }

    let stats = codec.stats();
    assert_eq!(stats.total_operations, 3);
    assert_eq!(stats.compressed, 3);
    assert!(stats.bytes_saved() > 0);
}

#[test]
fn test_below_threshold_passes_through() {
    let codec = engine(1024);
    let data = vec![b'a'; 1023];
    let result = codec.compress(&data, Some(CompressionAlgorithm::Zlib));
    assert_eq!(result.algorithm_used, CompressionAlgorithm::None);
    assert_eq!(result.compressed_size, result.original_size);
    assert_eq!(result.ratio, 1.0);
    assert_eq!(&result.data[..], &data[..]);
    assert_eq!(codec.stats().skipped_small, 1);

    let at_threshold = codec.compress(&vec![b'a'; 1024], Some(CompressionAlgorithm::Zlib));
    assert_eq!(at_threshold.algorithm_used, CompressionAlgorithm::Zlib);
}

#[test]
fn test_incompressible_data_falls_back() {
    let codec = engine(0);
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let noise: Vec<u8> = (0..8192).map(|_| rng.gen()).collect();

    let result = codec.compress(&noise, None);
    assert_eq!(result.algorithm_used, CompressionAlgorithm::None);
    assert_eq!(result.compressed_size, noise.len());
    assert_eq!(&result.data[..], &noise[..]);
    assert_eq!(codec.stats().skipped_ineffective, 1);
}

#[test]
fn test_disabled_engine_never_compresses() {
    let codec = CompressionEngine::new(CompressionConfig {
        enabled: false,
        ..CompressionConfig::default()
    });
    let result = codec.compress(&log_lines(100), Some(CompressionAlgorithm::Gzip));
    assert_eq!(result.algorithm_used, CompressionAlgorithm::None);
}

#[test]
fn test_corrupt_input_is_an_error() {
    let garbage = b"definitely not a gzip stream";
    for algorithm in [CompressionAlgorithm::Gzip, CompressionAlgorithm::Zlib] {
        assert!(matches!(
            compression::decompress(garbage, algorithm),
            Err(EdgeError::DecompressionError(_))
        ));
    }
}

#[test]
fn test_history_is_bounded() {
    let codec = CompressionEngine::new(CompressionConfig {
        history_limit: 3,
        ..CompressionConfig::default()
    });
    for size in [10usize, 20, 30, 40, 50] {
        codec.compress(&vec![0u8; size], None);
    }
    let sizes: Vec<usize> = codec.history().iter().map(|record| record.original_size).collect();
    assert_eq!(sizes, vec![30, 40, 50]);
    assert_eq!(codec.stats().total_operations, 5);
}

proptest! {
    #[test]
    fn prop_round_trip_is_exact(
        data in prop::collection::vec(any::<u8>(), 0..4096),
        repeat in 1usize..4,
        index in 0usize..4,
        threshold in prop::sample::select(vec![0usize, 64, 1024]),
    ) {
        let codec = engine(threshold);
        let data: Vec<u8> = data.iter().cycle().take(data.len() * repeat).copied().collect();
        let algorithm = ALGORITHMS[index];

        let result = codec.compress(&data, Some(algorithm));
        prop_assert_eq!(result.original_size, data.len());
        prop_assert!(result.compressed_size <= result.original_size);
        prop_assert_eq!(result.compressed_size, result.data.len());
        let back = codec.decompress(&result.data, result.algorithm_used).unwrap();
        prop_assert_eq!(&back[..], &data[..]);
    }
}
