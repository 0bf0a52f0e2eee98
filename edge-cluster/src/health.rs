//! Heartbeat-based failure detection for edge nodes.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::HealthConfig;
use crate::node::NodeId;
use crate::registry::NodeRegistry;
use crate::scheduler::WorkloadScheduler;

/// Marks silent nodes Offline and cancels what was running on them
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HealthConfig,
    registry: Arc<NodeRegistry>,
    scheduler: Arc<WorkloadScheduler>,
}

impl HeartbeatMonitor {
    /// Create a new heartbeat monitor
    pub fn new(
        config: HealthConfig,
        registry: Arc<NodeRegistry>,
        scheduler: Arc<WorkloadScheduler>,
    ) -> Self {
        Self {
            config,
            registry,
            scheduler,
        }
    }

    /// Run one health check. Returns the nodes that went Offline.
    ///
    /// A node already Offline is left alone, so repeated checks never
    /// report it twice.
    pub fn check_once(&self) -> Vec<NodeId> {
        let expired = self.registry.expire_heartbeats(self.config.heartbeat_timeout);
        for node_id in &expired {
            let cancelled = self.scheduler.cancel_workloads_on_node(node_id);
            if !cancelled.is_empty() {
                warn!(
                    "Node {} went offline with {} workload(s) cancelled",
                    node_id,
                    cancelled.len()
                );
            }
        }
        expired
    }

    /// Check every `check_interval` until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Heartbeat monitor started (every {:?}, timeout {:?})",
            self.config.check_interval, self.config.heartbeat_timeout
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Heartbeat monitor stopped");
    }
}
