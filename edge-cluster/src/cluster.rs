//! Cluster grouping of edge nodes.
//!
//! Clusters hold non-owning references to nodes owned by the registry.
//! `min_nodes`, `max_nodes` and `auto_scaling_enabled` are stored settings:
//! the predicates below report when a cluster is outside its bounds, but
//! nothing in this crate acts on them.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EdgeError, EdgeResult};
use crate::node::NodeId;

/// Name of the cluster every registered node joins
pub const DEFAULT_CLUSTER_NAME: &str = "default";

/// Unique identifier for a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub Uuid);

impl ClusterId {
    /// Create a new random cluster ID
    pub fn new() -> Self {
        ClusterId(Uuid::new_v4())
    }
}

impl Default for ClusterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named group of nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCluster {
    /// Cluster identifier
    pub id: ClusterId,
    /// Cluster name
    pub name: String,
    /// Member nodes, in join order
    pub nodes: Vec<NodeId>,
    /// Lower bound on members
    pub min_nodes: usize,
    /// Upper bound on members
    pub max_nodes: usize,
    /// Whether an external autoscaler may act on this cluster
    pub auto_scaling_enabled: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl EdgeCluster {
    /// Create an empty cluster
    pub fn new(name: impl Into<String>, min_nodes: usize, max_nodes: usize) -> Self {
        EdgeCluster {
            id: ClusterId::new(),
            name: name.into(),
            nodes: Vec::new(),
            min_nodes,
            max_nodes,
            auto_scaling_enabled: false,
            created_at: Utc::now(),
        }
    }

    /// Enable or disable autoscaling
    pub fn with_auto_scaling(mut self, enabled: bool) -> Self {
        self.auto_scaling_enabled = enabled;
        self
    }

    /// Check membership
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains(node_id)
    }

    /// Number of member nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the cluster has no members
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fewer members than `min_nodes`
    pub fn needs_scale_out(&self) -> bool {
        self.nodes.len() < self.min_nodes
    }

    /// More members than `min_nodes`, so one could be removed
    pub fn can_scale_in(&self) -> bool {
        self.nodes.len() > self.min_nodes
    }
}

/// Owns every cluster, including the default one
#[derive(Debug)]
pub struct ClusterManager {
    clusters: HashMap<ClusterId, EdgeCluster>,
    default_cluster: ClusterId,
}

impl ClusterManager {
    /// Create a manager holding only the unbounded default cluster
    pub fn new() -> Self {
        let default = EdgeCluster::new(DEFAULT_CLUSTER_NAME, 0, usize::MAX);
        let default_cluster = default.id;
        let mut clusters = HashMap::new();
        clusters.insert(default_cluster, default);
        Self {
            clusters,
            default_cluster,
        }
    }

    /// ID of the default cluster
    pub fn default_cluster(&self) -> ClusterId {
        self.default_cluster
    }

    /// Create a cluster and return its ID
    pub fn create_cluster(
        &mut self,
        name: impl Into<String>,
        min_nodes: usize,
        max_nodes: usize,
        auto_scaling_enabled: bool,
    ) -> EdgeResult<ClusterId> {
        if max_nodes < min_nodes {
            return Err(EdgeError::ConfigurationError(format!(
                "cluster max_nodes ({}) is below min_nodes ({})",
                max_nodes, min_nodes
            )));
        }
        let cluster =
            EdgeCluster::new(name, min_nodes, max_nodes).with_auto_scaling(auto_scaling_enabled);
        let id = cluster.id;
        self.clusters.insert(id, cluster);
        Ok(id)
    }

    /// Add a node. Returns false if it was already a member.
    pub fn add_node(&mut self, cluster_id: ClusterId, node_id: NodeId) -> EdgeResult<bool> {
        let cluster = self
            .clusters
            .get_mut(&cluster_id)
            .ok_or(EdgeError::ClusterNotFound(cluster_id))?;
        if cluster.contains(&node_id) {
            return Ok(false);
        }
        if cluster.nodes.len() >= cluster.max_nodes {
            return Err(EdgeError::ClusterFull(cluster_id, cluster.max_nodes));
        }
        cluster.nodes.push(node_id);
        Ok(true)
    }

    /// Remove a node. Returns false if it was not a member.
    pub fn remove_node(&mut self, cluster_id: ClusterId, node_id: &NodeId) -> EdgeResult<bool> {
        let cluster = self
            .clusters
            .get_mut(&cluster_id)
            .ok_or(EdgeError::ClusterNotFound(cluster_id))?;
        let before = cluster.nodes.len();
        cluster.nodes.retain(|id| id != node_id);
        Ok(cluster.nodes.len() != before)
    }

    /// Remove a node from every cluster, returning how many it left
    pub fn detach_everywhere(&mut self, node_id: &NodeId) -> usize {
        let mut detached = 0;
        for cluster in self.clusters.values_mut() {
            let before = cluster.nodes.len();
            cluster.nodes.retain(|id| id != node_id);
            if cluster.nodes.len() != before {
                detached += 1;
            }
        }
        detached
    }

    /// Get a cluster by ID
    pub fn get(&self, cluster_id: &ClusterId) -> Option<&EdgeCluster> {
        self.clusters.get(cluster_id)
    }

    /// All clusters, default first, then by creation time
    pub fn list(&self) -> Vec<EdgeCluster> {
        let mut clusters: Vec<EdgeCluster> = self.clusters.values().cloned().collect();
        let default_cluster = self.default_cluster;
        clusters.sort_by(|a, b| {
            (a.id != default_cluster, a.created_at, &a.name).cmp(&(
                b.id != default_cluster,
                b.created_at,
                &b.name,
            ))
        });
        clusters
    }
}

impl Default for ClusterManager {
    fn default() -> Self {
        Self::new()
    }
}
