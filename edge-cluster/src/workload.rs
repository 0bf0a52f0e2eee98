//! Workload descriptors, priorities and lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{EdgeError, EdgeResult};
use crate::node::NodeId;
use crate::resource::{ResourceRequirement, ResourceShare};

/// Unique identifier for a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadId(pub Uuid);

impl WorkloadId {
    /// Create a new random workload ID
    pub fn new() -> Self {
        WorkloadId(Uuid::new_v4())
    }
}

impl Default for WorkloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling priority. Ordering follows urgency, so `RealTime` is the
/// greatest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkloadPriority {
    /// Background work
    Low,
    /// Default priority
    Normal,
    /// Important work
    High,
    /// Must run before anything but real-time work
    Critical,
    /// Latency sensitive work, always placed first
    RealTime,
}

impl WorkloadPriority {
    /// Multiplier applied to the simulated execution time
    pub fn duration_factor(self) -> f64 {
        match self {
            WorkloadPriority::RealTime => 0.5,
            WorkloadPriority::High => 0.7,
            WorkloadPriority::Low => 1.5,
            WorkloadPriority::Normal | WorkloadPriority::Critical => 1.0,
        }
    }
}

impl Default for WorkloadPriority {
    fn default() -> Self {
        WorkloadPriority::Normal
    }
}

/// Workload lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadStatus {
    /// Waiting for a node
    Pending,
    /// Resources reserved on a node
    Assigned,
    /// Executor is running
    Running,
    /// Executor finished successfully
    Completed,
    /// Executor failed, timed out, or the workload expired while pending
    Error,
    /// Cancelled by the caller, node loss or shutdown
    Cancelled,
}

impl WorkloadStatus {
    /// All statuses, in declaration order
    pub const ALL: [WorkloadStatus; 6] = [
        WorkloadStatus::Pending,
        WorkloadStatus::Assigned,
        WorkloadStatus::Running,
        WorkloadStatus::Completed,
        WorkloadStatus::Error,
        WorkloadStatus::Cancelled,
    ];

    /// Check whether the status is final
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkloadStatus::Completed | WorkloadStatus::Error | WorkloadStatus::Cancelled
        )
    }

    /// Check whether moving to `next` keeps the lifecycle moving forward
    pub fn can_transition_to(self, next: WorkloadStatus) -> bool {
        use WorkloadStatus::*;
        match (self, next) {
            (Pending, Assigned) | (Assigned, Running) => true,
            (Running, Completed) | (Running, Error) => true,
            // Pending work can expire
            (Pending, Error) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A schedulable unit of work
#[derive(Debug, Clone)]
pub struct EdgeWorkload {
    /// Unique workload identifier, assigned on submit
    pub id: WorkloadId,
    /// Human-readable name
    pub name: String,
    /// Scheduling priority
    pub priority: WorkloadPriority,
    /// Resources the workload needs
    pub requirement: ResourceRequirement,
    /// Opaque input handed to the executor
    pub payload: serde_json::Value,
    pub(crate) status: WorkloadStatus,
    pub(crate) assigned_node: Option<NodeId>,
    pub(crate) reservation: Option<ResourceShare>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) result: Option<serde_json::Value>,
    pub(crate) error: Option<String>,
    pub(crate) sequence: u64,
    pub(crate) submitted: Instant,
    pub(crate) started: Option<Instant>,
    pub(crate) finished: Option<Instant>,
}

impl EdgeWorkload {
    /// Create a new workload descriptor
    pub fn new(
        name: impl Into<String>,
        priority: WorkloadPriority,
        requirement: ResourceRequirement,
    ) -> Self {
        EdgeWorkload {
            id: WorkloadId::new(),
            name: name.into(),
            priority,
            requirement,
            payload: serde_json::Value::Null,
            status: WorkloadStatus::Pending,
            assigned_node: None,
            reservation: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            sequence: 0,
            submitted: Instant::now(),
            started: None,
            finished: None,
        }
    }

    /// Attach an executor payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Current status
    pub fn status(&self) -> WorkloadStatus {
        self.status
    }

    /// Node the workload is placed on
    pub fn assigned_node(&self) -> Option<NodeId> {
        self.assigned_node
    }

    /// Executor result, once completed
    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    /// Build the status record returned to callers
    pub fn status_record(&self) -> WorkloadStatusRecord {
        WorkloadStatusRecord {
            id: self.id,
            name: self.name.clone(),
            priority: self.priority,
            status: self.status,
            assigned_node: self.assigned_node,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }

    pub(crate) fn transition(&mut self, next: WorkloadStatus) -> EdgeResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(EdgeError::InvalidWorkloadTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
            self.finished = Some(Instant::now());
        }
        Ok(())
    }

    /// Time between start and finish, for completed workloads
    pub(crate) fn processing_time(&self) -> Option<std::time::Duration> {
        match (self.started, self.finished) {
            (Some(started), Some(finished)) => Some(finished.saturating_duration_since(started)),
            _ => None,
        }
    }
}

/// Snapshot of a workload returned by status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadStatusRecord {
    /// Workload identifier
    pub id: WorkloadId,
    /// Workload name
    pub name: String,
    /// Priority
    pub priority: WorkloadPriority,
    /// Current status
    pub status: WorkloadStatus,
    /// Node the workload is or was placed on
    pub assigned_node: Option<NodeId>,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Execution start time
    pub started_at: Option<DateTime<Utc>>,
    /// Time the workload reached a final status
    pub completed_at: Option<DateTime<Utc>>,
    /// Executor result
    pub result: Option<serde_json::Value>,
    /// Failure reason
    pub error: Option<String>,
}
