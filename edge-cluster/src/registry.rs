//! Edge node registry.
//!
//! The registry owns every [`EdgeNode`] and every cluster. Other components
//! never touch node state directly: the scheduler reserves and releases
//! resources through [`NodeRegistry::reserve`] and [`NodeRegistry::release`],
//! and the heartbeat monitor drives timeouts through
//! [`NodeRegistry::expire_heartbeats`]. Each operation takes the registry lock
//! once and never awaits while holding it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::cluster::{ClusterId, ClusterManager, EdgeCluster};
use crate::error::{EdgeError, EdgeResult};
use crate::node::{EdgeNode, NodeId, NodeStatus};
use crate::placement::PlacementCandidate;
use crate::resource::{ResourceRequirement, ResourceShare};
use crate::workload::WorkloadId;

/// Capacity of the node event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Node lifecycle events published by the registry
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// Node registered
    Added(NodeId),
    /// Node deleted
    Removed(NodeId),
    /// Node came back after a heartbeat
    Online(NodeId),
    /// Node missed its heartbeat deadline
    Offline(NodeId),
    /// Administrative status change
    StatusChanged {
        /// Node concerned
        node_id: NodeId,
        /// Previous status
        from: NodeStatus,
        /// New status
        to: NodeStatus,
    },
}

#[derive(Debug, Default)]
struct RegistryState {
    nodes: HashMap<NodeId, EdgeNode>,
    clusters: ClusterManager,
}

/// Registry of edge nodes and clusters
#[derive(Debug)]
pub struct NodeRegistry {
    state: Mutex<RegistryState>,
    events: broadcast::Sender<NodeEvent>,
    next_sequence: AtomicU64,
}

impl NodeRegistry {
    /// Create an empty registry with a default cluster
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(RegistryState::default()),
            events,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Subscribe to node events
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: NodeEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Register a node. It becomes Online and joins the default cluster.
    pub fn add_node(&self, mut node: EdgeNode) -> EdgeResult<NodeId> {
        let node_id = node.id;
        {
            let mut state = self.state.lock();
            if state.nodes.contains_key(&node_id) {
                return Err(EdgeError::NodeAlreadyExists(node_id));
            }
            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            node.mark_registered(sequence);
            let default_cluster = state.clusters.default_cluster();
            state.clusters.add_node(default_cluster, node_id)?;
            info!(
                "Registered {:?} node {} ({}) at {}",
                node.node_type, node.name, node_id, node.location
            );
            state.nodes.insert(node_id, node);
        }
        self.publish(NodeEvent::Added(node_id));
        Ok(node_id)
    }

    /// Delete a node and detach it from every cluster.
    ///
    /// Returns the removed node so the caller can deal with the workloads it
    /// still lists, or `None` for an unknown ID.
    pub fn remove_node(&self, node_id: &NodeId) -> Option<EdgeNode> {
        let removed = {
            let mut state = self.state.lock();
            let node = state.nodes.remove(node_id)?;
            state.clusters.detach_everywhere(node_id);
            node
        };
        info!("Removed node {} ({})", removed.name, node_id);
        self.publish(NodeEvent::Removed(*node_id));
        Some(removed)
    }

    /// Record a heartbeat. Returns false for an unknown node.
    pub fn heartbeat(&self, node_id: &NodeId) -> bool {
        let came_online = {
            let mut state = self.state.lock();
            match state.nodes.get_mut(node_id) {
                Some(node) => node.record_heartbeat(),
                None => return false,
            }
        };
        if came_online {
            info!("Node {} is back online", node_id);
            self.publish(NodeEvent::Online(*node_id));
        } else {
            debug!("Heartbeat from node {}", node_id);
        }
        true
    }

    /// Move Online nodes whose last heartbeat is older than `timeout` to
    /// Offline, returning the nodes that changed.
    pub fn expire_heartbeats(&self, timeout: Duration) -> Vec<NodeId> {
        let mut expired: Vec<(u64, NodeId)> = {
            let mut state = self.state.lock();
            state
                .nodes
                .values_mut()
                .filter_map(|node| {
                    node.check_timeout(timeout)
                        .then_some((node.sequence, node.id))
                })
                .collect()
        };
        expired.sort();
        for (_, node_id) in &expired {
            warn!("Node {} missed its heartbeat deadline, marking offline", node_id);
            self.publish(NodeEvent::Offline(*node_id));
        }
        expired.into_iter().map(|(_, id)| id).collect()
    }

    /// Administrative status change (Maintenance, Error, or back to Online
    /// from Maintenance).
    pub fn set_status(&self, node_id: &NodeId, status: NodeStatus) -> EdgeResult<()> {
        let from = {
            let mut state = self.state.lock();
            let node = state
                .nodes
                .get_mut(node_id)
                .ok_or(EdgeError::NodeNotFound(*node_id))?;
            let from = node.status;
            let administrative = matches!(
                (from, status),
                (NodeStatus::Online, NodeStatus::Maintenance)
                    | (NodeStatus::Online, NodeStatus::Error)
                    | (NodeStatus::Maintenance, NodeStatus::Online)
            );
            if !administrative {
                return Err(EdgeError::InvalidNodeTransition { from, to: status });
            }
            node.transition(status)?;
            from
        };
        info!("Node {} moved from {} to {}", node_id, from, status);
        self.publish(NodeEvent::StatusChanged {
            node_id: *node_id,
            from,
            to: status,
        });
        Ok(())
    }

    /// Get a snapshot of a node
    pub fn get(&self, node_id: &NodeId) -> Option<EdgeNode> {
        self.state.lock().nodes.get(node_id).cloned()
    }

    /// Current status of a node
    pub fn status(&self, node_id: &NodeId) -> Option<NodeStatus> {
        self.state.lock().nodes.get(node_id).map(EdgeNode::status)
    }

    /// Check if a node is registered
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.state.lock().nodes.contains_key(node_id)
    }

    /// Snapshots of all nodes, in registration order
    pub fn list(&self) -> Vec<EdgeNode> {
        let mut nodes: Vec<EdgeNode> = self.state.lock().nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.sequence);
        nodes
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Check if no node is registered
    pub fn is_empty(&self) -> bool {
        self.state.lock().nodes.is_empty()
    }

    /// Number of nodes per status
    pub fn status_counts(&self) -> HashMap<NodeStatus, usize> {
        let state = self.state.lock();
        let mut counts = HashMap::new();
        for node in state.nodes.values() {
            *counts.entry(node.status).or_insert(0) += 1;
        }
        counts
    }

    /// Online nodes able to host `requirement`, in registration order
    pub fn suitable_nodes(&self, requirement: &ResourceRequirement) -> Vec<PlacementCandidate> {
        let state = self.state.lock();
        let mut candidates: Vec<PlacementCandidate> = state
            .nodes
            .values()
            .filter(|node| node.is_online())
            .filter_map(|node| {
                let share = requirement.share_of(&node.capacity)?;
                node.available.covers(&share).then(|| PlacementCandidate {
                    node_id: node.id,
                    sequence: node.sequence,
                    available: node.available,
                    share,
                })
            })
            .collect();
        candidates.sort_by_key(|c| c.sequence);
        candidates
    }

    /// Reserve `share` on a node for a workload.
    ///
    /// The node is re-validated under the lock: it must still exist, be
    /// Online and have enough of every resource.
    pub fn reserve(
        &self,
        node_id: &NodeId,
        workload_id: WorkloadId,
        share: &ResourceShare,
    ) -> EdgeResult<()> {
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(node_id)
            .ok_or(EdgeError::NodeNotFound(*node_id))?;
        if !node.is_online() || !node.available.covers(share) {
            return Err(EdgeError::ResourceUnavailable(workload_id));
        }
        node.available.deduct(share);
        node.workloads.push(workload_id);
        Ok(())
    }

    /// Give a workload's reservation back to its node.
    ///
    /// Returns false when the node is gone or no longer lists the workload,
    /// in which case nothing is released.
    pub fn release(&self, node_id: &NodeId, workload_id: &WorkloadId, share: &ResourceShare) -> bool {
        let mut state = self.state.lock();
        let Some(node) = state.nodes.get_mut(node_id) else {
            return false;
        };
        let before = node.workloads.len();
        node.workloads.retain(|id| id != workload_id);
        if node.workloads.len() == before {
            return false;
        }
        node.available.release(share);
        true
    }

    /// Create a cluster
    pub fn create_cluster(
        &self,
        name: impl Into<String>,
        min_nodes: usize,
        max_nodes: usize,
        auto_scaling_enabled: bool,
    ) -> EdgeResult<ClusterId> {
        let name = name.into();
        let id = self
            .state
            .lock()
            .clusters
            .create_cluster(name.clone(), min_nodes, max_nodes, auto_scaling_enabled)?;
        info!("Created cluster {} ({})", name, id);
        Ok(id)
    }

    /// Add a registered node to a cluster
    pub fn add_node_to_cluster(&self, cluster_id: ClusterId, node_id: NodeId) -> EdgeResult<bool> {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&node_id) {
            return Err(EdgeError::NodeNotFound(node_id));
        }
        state.clusters.add_node(cluster_id, node_id)
    }

    /// Remove a node from a cluster
    pub fn remove_node_from_cluster(&self, cluster_id: ClusterId, node_id: &NodeId) -> EdgeResult<bool> {
        self.state.lock().clusters.remove_node(cluster_id, node_id)
    }

    /// Get a cluster
    pub fn cluster(&self, cluster_id: &ClusterId) -> Option<EdgeCluster> {
        self.state.lock().clusters.get(cluster_id).cloned()
    }

    /// ID of the default cluster
    pub fn default_cluster(&self) -> ClusterId {
        self.state.lock().clusters.default_cluster()
    }

    /// All clusters
    pub fn list_clusters(&self) -> Vec<EdgeCluster> {
        self.state.lock().clusters.list()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
