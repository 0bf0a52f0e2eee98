//! Error types for the edge-cluster crate.

use thiserror::Error;

use crate::cluster::ClusterId;
use crate::node::{NodeId, NodeStatus};
use crate::workload::{WorkloadId, WorkloadStatus};

/// Main error type for edge orchestration operations
#[derive(Error, Debug)]
pub enum EdgeError {
    /// Invalid configuration, the only fatal condition
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Node already exists in the registry
    #[error("Node already exists: {0}")]
    NodeAlreadyExists(NodeId),

    /// Node not found in the registry
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Workload not found in the workload table
    #[error("Workload not found: {0}")]
    WorkloadNotFound(WorkloadId),

    /// Cluster not found
    #[error("Cluster not found: {0}")]
    ClusterNotFound(ClusterId),

    /// Cluster reached its configured maximum node count
    #[error("Cluster {0} already holds its maximum of {1} nodes")]
    ClusterFull(ClusterId, usize),

    /// Node status change not allowed
    #[error("Invalid node transition from {from:?} to {to:?}")]
    InvalidNodeTransition {
        /// Current status
        from: NodeStatus,
        /// Requested status
        to: NodeStatus,
    },

    /// Workload status change not allowed
    #[error("Invalid workload transition from {from:?} to {to:?}")]
    InvalidWorkloadTransition {
        /// Current status
        from: WorkloadStatus,
        /// Requested status
        to: WorkloadStatus,
    },

    /// No node can host the requested resources
    #[error("No node has resources available for workload {0}")]
    ResourceUnavailable(WorkloadId),

    /// Compression failed
    #[error("Compression error: {0}")]
    CompressionError(String),

    /// Decompression failed
    #[error("Decompression error: {0}")]
    DecompressionError(String),

    /// A single cache entry is larger than the whole cache
    #[error("Cache entry of {size} bytes exceeds the maximum of {max} bytes")]
    CacheOverflow {
        /// Entry size in bytes
        size: usize,
        /// Configured cache maximum
        max: usize,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Injected executor or fetcher failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Injected executor exceeded the configured timeout
    #[error("Execution timed out after {0:?}")]
    ExecutionTimeout(std::time::Duration),
}

/// Type alias for Result with EdgeError
pub type EdgeResult<T> = Result<T, EdgeError>;

impl From<bincode::Error> for EdgeError {
    fn from(err: bincode::Error) -> Self {
        EdgeError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for EdgeError {
    fn from(err: serde_json::Error) -> Self {
        EdgeError::SerializationError(err.to_string())
    }
}

impl From<anyhow::Error> for EdgeError {
    fn from(err: anyhow::Error) -> Self {
        EdgeError::ExecutionFailed(format!("{:#}", err))
    }
}
