//! Placement policies for choosing a node among suitable candidates

use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::resource::ResourceShare;

/// A node that passed the feasibility check for one workload
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementCandidate {
    /// Candidate node
    pub node_id: NodeId,
    /// Registration order of the node, lower registered earlier
    pub sequence: u64,
    /// What the node currently has available
    pub available: ResourceShare,
    /// What the workload would reserve on this node
    pub share: ResourceShare,
}

/// Strategy for picking one node out of the suitable candidates
pub trait PlacementPolicy: Send + Sync {
    /// Short policy name, used in logs
    fn name(&self) -> &'static str;

    /// Pick a node, or `None` when there are no candidates
    fn select(&self, candidates: &[PlacementCandidate]) -> Option<NodeId>;
}

/// Greedy best-available placement: the candidate with the most available
/// CPU wins, earlier registration breaks ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestAvailable;

impl PlacementPolicy for BestAvailable {
    fn name(&self) -> &'static str {
        "best-available"
    }

    fn select(&self, candidates: &[PlacementCandidate]) -> Option<NodeId> {
        let mut best: Option<&PlacementCandidate> = None;
        for candidate in candidates {
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    let more_cpu = candidate.available.cpu() > current.available.cpu();
                    let same_cpu = candidate.available.cpu() == current.available.cpu();
                    if more_cpu || (same_cpu && candidate.sequence < current.sequence) {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best.map(|c| c.node_id)
    }
}

/// First-fit placement: the earliest registered suitable node wins
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFit;

impl PlacementPolicy for FirstFit {
    fn name(&self) -> &'static str {
        "first-fit"
    }

    fn select(&self, candidates: &[PlacementCandidate]) -> Option<NodeId> {
        candidates
            .iter()
            .min_by_key(|c| c.sequence)
            .map(|c| c.node_id)
    }
}

/// Placement algorithm selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementAlgorithm {
    /// Most available CPU
    BestAvailable,
    /// Earliest registered node
    FirstFit,
}

impl Default for PlacementAlgorithm {
    fn default() -> Self {
        PlacementAlgorithm::BestAvailable
    }
}

impl PlacementAlgorithm {
    /// Build the policy object for this algorithm
    pub fn policy(self) -> Box<dyn PlacementPolicy> {
        match self {
            PlacementAlgorithm::BestAvailable => Box::new(BestAvailable),
            PlacementAlgorithm::FirstFit => Box::new(FirstFit),
        }
    }
}
