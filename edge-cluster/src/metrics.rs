//! Point-in-time metrics for the monitoring collaborator.
//!
//! Nothing here pushes: callers poll [`MetricsSnapshot`] through the system
//! handle and serialize it as they see fit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::compression::CompressionStats;
use crate::error::EdgeResult;
use crate::node::NodeStatus;
use crate::optimizer::OptimizerStats;
use crate::scheduler::SchedulerStats;
use crate::workload::WorkloadStatus;

/// Node counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Registered nodes
    pub total: usize,
    /// Nodes still initializing
    pub initializing: usize,
    /// Nodes accepting work
    pub online: usize,
    /// Nodes that missed their heartbeat
    pub offline: usize,
    /// Nodes under maintenance
    pub maintenance: usize,
    /// Nodes in error
    pub error: usize,
}

impl NodeMetrics {
    /// Build from per-status counts
    pub fn from_counts(counts: &HashMap<NodeStatus, usize>) -> Self {
        let count = |status| counts.get(&status).copied().unwrap_or(0);
        Self {
            total: counts.values().sum(),
            initializing: count(NodeStatus::Initializing),
            online: count(NodeStatus::Online),
            offline: count(NodeStatus::Offline),
            maintenance: count(NodeStatus::Maintenance),
            error: count(NodeStatus::Error),
        }
    }
}

/// Workload counts per status, plus lifetime counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadMetrics {
    /// Workloads in the table
    pub total: usize,
    /// Waiting for a node
    pub pending: usize,
    /// Reserved but not yet running
    pub assigned: usize,
    /// Executing
    pub running: usize,
    /// Finished successfully
    pub completed: usize,
    /// Failed, timed out or expired
    pub error: usize,
    /// Cancelled
    pub cancelled: usize,
    /// Lifetime counters, unaffected by pruning
    pub totals: SchedulerStats,
}

impl WorkloadMetrics {
    /// Build from per-status counts and scheduler counters
    pub fn from_counts(counts: &HashMap<WorkloadStatus, usize>, totals: SchedulerStats) -> Self {
        let count = |status| counts.get(&status).copied().unwrap_or(0);
        Self {
            total: counts.values().sum(),
            pending: count(WorkloadStatus::Pending),
            assigned: count(WorkloadStatus::Assigned),
            running: count(WorkloadStatus::Running),
            completed: count(WorkloadStatus::Completed),
            error: count(WorkloadStatus::Error),
            cancelled: count(WorkloadStatus::Cancelled),
            totals,
        }
    }
}

/// Snapshot of every counter in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Node counts
    pub nodes: NodeMetrics,
    /// Number of clusters, the default one included
    pub clusters: usize,
    /// Workload counts
    pub workloads: WorkloadMetrics,
    /// Cache counters
    pub cache: CacheStats,
    /// Compression counters
    pub compression: CompressionStats,
    /// Request optimizer counters
    pub optimizer: OptimizerStats,
}

impl MetricsSnapshot {
    /// Serialize to JSON
    pub fn to_json(&self) -> EdgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to indented JSON
    pub fn to_json_pretty(&self) -> EdgeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
