//! Edge Cluster Orchestration
//!
//! This crate provides the control plane of an edge deployment: a registry of
//! resource-bearing edge nodes with heartbeat-based failure detection, a
//! priority-ordered workload scheduler with best-available placement, cluster
//! grouping, and a request optimizer built on a size-bounded TTL cache and a
//! compression codec.
//!
//! Everything hangs off an [`EdgeSystem`] handle; the background loops run
//! between [`EdgeSystem::start`] and [`EdgeSystem::stop`].

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]
#![warn(missing_docs)]

pub mod cache;
pub mod cluster;
pub mod compression;
pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod metrics;
pub mod node;
pub mod optimizer;
pub mod placement;
pub mod registry;
pub mod resource;
pub mod scheduler;
pub mod system;
pub mod workload;

pub use cache::{CacheEntry, CacheStats, CacheStore, EvictionPolicy, EvictionStrategy};
pub use cluster::{ClusterId, EdgeCluster};
pub use compression::{CompressionAlgorithm, CompressionConfig, CompressionEngine, CompressionLevel, CompressionResult};
pub use config::{CacheConfig, EdgeConfig, HealthConfig, OptimizerConfig, SchedulerConfig};
pub use error::{EdgeError, EdgeResult};
pub use executor::{ExecutionContext, FnExecutor, SimulatedExecutor, WorkloadExecutor};
pub use health::HeartbeatMonitor;
pub use metrics::MetricsSnapshot;
pub use node::{EdgeNode, NodeId, NodeStatus, NodeType};
pub use optimizer::{EchoFetcher, FnFetcher, OptimizedResponse, RequestFetcher, RequestOptimizer};
pub use placement::{PlacementAlgorithm, PlacementPolicy};
pub use registry::{NodeEvent, NodeRegistry};
pub use resource::{ResourceCapacity, ResourceRequirement, ResourceShare};
pub use scheduler::{CycleReport, SchedulerStats, WorkloadScheduler};
pub use system::EdgeSystem;
pub use workload::{EdgeWorkload, WorkloadId, WorkloadPriority, WorkloadStatus, WorkloadStatusRecord};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        CompressionAlgorithm, EdgeConfig, EdgeError, EdgeNode, EdgeResult, EdgeSystem, EdgeWorkload,
        NodeId, NodeStatus, NodeType, ResourceCapacity, ResourceRequirement, WorkloadId,
        WorkloadPriority, WorkloadStatus,
    };
}
