//! Node module for edge node identification and health tracking.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{EdgeError, EdgeResult};
use crate::resource::{ResourceCapacity, ResourceShare};
use crate::workload::WorkloadId;

/// Unique identifier for an edge node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        NodeId(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of edge node. Descriptive only, it never affects placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// General purpose compute
    Compute,
    /// Storage oriented node
    Storage,
    /// Network gateway
    Gateway,
    /// Sensor or data collection device
    Sensor,
    /// Mixed role
    Hybrid,
}

/// Node health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Node descriptor created but not yet registered
    Initializing,
    /// Node is registered and heartbeating
    Online,
    /// Node missed its heartbeat deadline
    Offline,
    /// Node taken out of placement by an operator
    Maintenance,
    /// Node flagged as faulty by an operator
    Error,
}

impl NodeStatus {
    /// All statuses, in declaration order
    pub const ALL: [NodeStatus; 5] = [
        NodeStatus::Initializing,
        NodeStatus::Online,
        NodeStatus::Offline,
        NodeStatus::Maintenance,
        NodeStatus::Error,
    ];

    /// Check whether moving to `next` is an allowed transition.
    ///
    /// Maintenance may return to Online once the operator is done with it.
    pub fn can_transition_to(self, next: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, next),
            (Initializing, Online)
                | (Online, Offline)
                | (Offline, Online)
                | (Online, Maintenance)
                | (Online, Error)
                | (Maintenance, Online)
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Initializing => write!(f, "Initializing"),
            NodeStatus::Online => write!(f, "Online"),
            NodeStatus::Offline => write!(f, "Offline"),
            NodeStatus::Maintenance => write!(f, "Maintenance"),
            NodeStatus::Error => write!(f, "Error"),
        }
    }
}

/// An edge node and its live state.
///
/// The descriptor fields are public so callers can build a node before
/// registering it. Status, availability, heartbeat and workload tracking are
/// only changed by the registry, the scheduler and the heartbeat monitor.
#[derive(Debug, Clone)]
pub struct EdgeNode {
    /// Unique node identifier
    pub id: NodeId,
    /// Human-readable node name
    pub name: String,
    /// Node kind
    pub node_type: NodeType,
    /// Free-form location label
    pub location: String,
    /// Total hardware capacity
    pub capacity: ResourceCapacity,
    /// Capability tags
    pub capabilities: BTreeSet<String>,
    pub(crate) available: ResourceShare,
    pub(crate) status: NodeStatus,
    pub(crate) workloads: Vec<WorkloadId>,
    pub(crate) last_heartbeat: Instant,
    pub(crate) last_heartbeat_at: DateTime<Utc>,
    pub(crate) registered_at: Option<DateTime<Utc>>,
    pub(crate) sequence: u64,
}

impl EdgeNode {
    /// Create a new node descriptor with full availability
    pub fn new(
        name: impl Into<String>,
        node_type: NodeType,
        location: impl Into<String>,
        capacity: ResourceCapacity,
    ) -> Self {
        EdgeNode {
            id: NodeId::new(),
            name: name.into(),
            node_type,
            location: location.into(),
            capacity,
            capabilities: BTreeSet::new(),
            available: ResourceShare::full(),
            status: NodeStatus::Initializing,
            workloads: Vec::new(),
            last_heartbeat: Instant::now(),
            last_heartbeat_at: Utc::now(),
            registered_at: None,
            sequence: 0,
        }
    }

    /// Use a specific node ID
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    /// Add a capability tag
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Check if node has a specific capability
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Current status
    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Available percentages per resource dimension
    pub fn available(&self) -> &ResourceShare {
        &self.available
    }

    /// Workloads currently assigned to this node
    pub fn workloads(&self) -> &[WorkloadId] {
        &self.workloads
    }

    /// Wall-clock time of the last heartbeat
    pub fn last_heartbeat_at(&self) -> DateTime<Utc> {
        self.last_heartbeat_at
    }

    /// Wall-clock time the node was registered
    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    /// Check if node is online
    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }

    /// Time since last heartbeat
    pub fn time_since_last_heartbeat(&self) -> Duration {
        self.last_heartbeat.elapsed()
    }

    /// Move to a new status, rejecting transitions that are not allowed
    pub(crate) fn transition(&mut self, next: NodeStatus) -> EdgeResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(EdgeError::InvalidNodeTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark the node registered and online
    pub(crate) fn mark_registered(&mut self, sequence: u64) {
        let now = Utc::now();
        self.status = NodeStatus::Online;
        self.available = ResourceShare::full();
        self.workloads.clear();
        self.sequence = sequence;
        self.registered_at = Some(now);
        self.last_heartbeat = Instant::now();
        self.last_heartbeat_at = now;
    }

    /// Record a heartbeat. Returns true if the node came back online.
    pub(crate) fn record_heartbeat(&mut self) -> bool {
        self.last_heartbeat = Instant::now();
        self.last_heartbeat_at = Utc::now();
        if self.status == NodeStatus::Offline {
            self.status = NodeStatus::Online;
            true
        } else {
            false
        }
    }

    /// Check if node is unreachable based on heartbeat timeout.
    ///
    /// Only an Online node can time out, so repeated checks without a new
    /// heartbeat report the transition exactly once.
    pub(crate) fn check_timeout(&mut self, timeout: Duration) -> bool {
        if self.status == NodeStatus::Online && self.last_heartbeat.elapsed() > timeout {
            self.status = NodeStatus::Offline;
            true
        } else {
            false
        }
    }
}
