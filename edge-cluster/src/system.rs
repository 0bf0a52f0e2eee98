//! System handle wiring every component together.
//!
//! [`EdgeSystem`] is the explicit context object callers hold: it owns the
//! registry, scheduler, heartbeat monitor, cache, codec and optimizer, and
//! runs the three background loops between [`EdgeSystem::start`] and
//! [`EdgeSystem::stop`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use log::{error, info, warn};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::cache::CacheStore;
use crate::cluster::{ClusterId, EdgeCluster};
use crate::compression::{CompressionAlgorithm, CompressionEngine, CompressionResult};
use crate::config::EdgeConfig;
use crate::error::EdgeResult;
use crate::executor::{SimulatedExecutor, WorkloadExecutor};
use crate::health::HeartbeatMonitor;
use crate::metrics::{MetricsSnapshot, NodeMetrics, WorkloadMetrics};
use crate::node::{EdgeNode, NodeId, NodeStatus};
use crate::optimizer::{EchoFetcher, OptimizedResponse, RequestFetcher, RequestOptimizer};
use crate::registry::{NodeEvent, NodeRegistry};
use crate::scheduler::{CycleReport, WorkloadScheduler};
use crate::workload::{EdgeWorkload, WorkloadId, WorkloadStatusRecord};

/// Edge orchestration system
pub struct EdgeSystem {
    config: EdgeConfig,
    registry: Arc<NodeRegistry>,
    scheduler: Arc<WorkloadScheduler>,
    monitor: Arc<HeartbeatMonitor>,
    cache: Arc<CacheStore>,
    compression: Arc<CompressionEngine>,
    optimizer: Arc<RequestOptimizer>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EdgeSystem {
    /// Create a system running workloads on the simulated executor and
    /// answering requests with [`EchoFetcher`]
    pub fn new(config: EdgeConfig) -> EdgeResult<Self> {
        let executor = Arc::new(SimulatedExecutor::new(config.scheduler.executor_base_duration));
        Self::with_components(config, executor, Arc::new(EchoFetcher))
    }

    /// Create a system with injected workload executor and request fetcher
    pub fn with_components(
        config: EdgeConfig,
        executor: Arc<dyn WorkloadExecutor>,
        fetcher: Arc<dyn RequestFetcher>,
    ) -> EdgeResult<Self> {
        let config = config.build()?;

        let registry = Arc::new(NodeRegistry::new());
        let scheduler = Arc::new(WorkloadScheduler::new(
            registry.clone(),
            executor,
            config.scheduler.clone(),
        ));
        let monitor = Arc::new(HeartbeatMonitor::new(
            config.health.clone(),
            registry.clone(),
            scheduler.clone(),
        ));
        let cache = Arc::new(CacheStore::new(config.cache.clone()));
        let compression = Arc::new(CompressionEngine::new(config.compression));
        let optimizer = Arc::new(RequestOptimizer::new(
            config.optimizer.clone(),
            cache.clone(),
            compression.clone(),
            fetcher,
        ));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            registry,
            scheduler,
            monitor,
            cache,
            compression,
            optimizer,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the heartbeat monitor, scheduler and cache cleanup loops.
    ///
    /// Must be called from within a tokio runtime. Calling it while the
    /// loops are running does nothing.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("Edge system already started");
            return;
        }
        self.shutdown.send_replace(false);

        tasks.push(tokio::spawn(
            self.monitor.clone().run(self.shutdown.subscribe()),
        ));
        tasks.push(tokio::spawn(
            self.scheduler.clone().run(self.shutdown.subscribe()),
        ));
        tasks.push(tokio::spawn(
            self.cache.clone().run_cleanup(self.shutdown.subscribe()),
        ));
        info!("Edge system started");
    }

    /// Signal every loop to stop, wait for them, then cancel whatever is
    /// still running. Registry and cache stay readable.
    pub async fn stop(&self) -> usize {
        self.shutdown.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Background loop ended abnormally: {}", e);
            }
        }
        let cancelled = self.scheduler.cancel_running();
        info!("Edge system stopped, {} running workload(s) cancelled", cancelled);
        cancelled
    }

    /// Whether the background loops are running
    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Validated configuration
    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// Node registry
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Workload scheduler
    pub fn scheduler(&self) -> &Arc<WorkloadScheduler> {
        &self.scheduler
    }

    /// Cache store
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Register a node. Returns false if the ID is already taken.
    pub fn add_edge_node(&self, node: EdgeNode) -> bool {
        match self.registry.add_node(node) {
            Ok(_) => true,
            Err(e) => {
                warn!("Could not add edge node: {}", e);
                false
            }
        }
    }

    /// Remove a node, cancelling the workloads placed on it
    pub fn remove_edge_node(&self, node_id: &NodeId) -> bool {
        if self.registry.remove_node(node_id).is_none() {
            return false;
        }
        self.scheduler.cancel_workloads_on_node(node_id);
        true
    }

    /// Record a heartbeat. Returns false for an unknown node.
    pub fn heartbeat(&self, node_id: &NodeId) -> bool {
        self.registry.heartbeat(node_id)
    }

    /// Move a node to Maintenance or Error, or back to Online from
    /// Maintenance. Workloads already placed keep running.
    pub fn set_node_status(&self, node_id: &NodeId, status: NodeStatus) -> EdgeResult<()> {
        self.registry.set_status(node_id, status)
    }

    /// Snapshot of a node
    pub fn node(&self, node_id: &NodeId) -> Option<EdgeNode> {
        self.registry.get(node_id)
    }

    /// Snapshots of every node, in registration order
    pub fn nodes(&self) -> Vec<EdgeNode> {
        self.registry.list()
    }

    /// Subscribe to node lifecycle events
    pub fn subscribe_node_events(&self) -> broadcast::Receiver<NodeEvent> {
        self.registry.subscribe()
    }

    /// Run one health check now
    pub fn check_health(&self) -> Vec<NodeId> {
        self.monitor.check_once()
    }

    /// Submit a workload for scheduling
    pub fn submit_workload(&self, workload: EdgeWorkload) -> WorkloadId {
        self.scheduler.submit(workload)
    }

    /// Status record of a workload
    pub fn workload_status(&self, workload_id: &WorkloadId) -> Option<WorkloadStatusRecord> {
        self.scheduler.status(workload_id)
    }

    /// Cancel a workload that has not finished
    pub fn cancel_workload(&self, workload_id: &WorkloadId) -> EdgeResult<()> {
        self.scheduler.cancel_workload(workload_id)
    }

    /// Run one scheduling cycle now
    pub fn run_scheduling_cycle(&self) -> CycleReport {
        self.scheduler.run_cycle()
    }

    /// Drop finished workloads older than `older_than`
    pub fn prune_terminal_workloads(&self, older_than: Duration) -> usize {
        self.scheduler.prune_terminal_workloads(older_than)
    }

    /// Create a cluster
    pub fn create_cluster(
        &self,
        name: impl Into<String>,
        min_nodes: usize,
        max_nodes: usize,
        auto_scaling_enabled: bool,
    ) -> EdgeResult<ClusterId> {
        self.registry
            .create_cluster(name, min_nodes, max_nodes, auto_scaling_enabled)
    }

    /// Add a registered node to a cluster
    pub fn add_node_to_cluster(&self, cluster_id: ClusterId, node_id: NodeId) -> EdgeResult<bool> {
        self.registry.add_node_to_cluster(cluster_id, node_id)
    }

    /// Remove a node from a cluster
    pub fn remove_node_from_cluster(&self, cluster_id: ClusterId, node_id: &NodeId) -> EdgeResult<bool> {
        self.registry.remove_node_from_cluster(cluster_id, node_id)
    }

    /// Get a cluster
    pub fn cluster(&self, cluster_id: &ClusterId) -> Option<EdgeCluster> {
        self.registry.cluster(cluster_id)
    }

    /// All clusters, default first
    pub fn list_clusters(&self) -> Vec<EdgeCluster> {
        self.registry.list_clusters()
    }

    /// Look up a cached value
    pub fn cache_get(&self, key: &str) -> Option<Bytes> {
        self.cache.get(key)
    }

    /// Cache a value. Returns false if it is larger than the whole cache.
    pub fn cache_set(&self, key: impl Into<String>, value: impl Into<Bytes>, ttl: Option<Duration>) -> bool {
        self.cache.set(key, value, ttl)
    }

    /// Compress a payload
    pub fn compress(&self, data: &[u8], algorithm: Option<CompressionAlgorithm>) -> CompressionResult {
        self.compression.compress(data, algorithm)
    }

    /// Decompress a payload
    pub fn decompress(&self, data: &[u8], algorithm: CompressionAlgorithm) -> EdgeResult<Bytes> {
        self.compression.decompress(data, algorithm)
    }

    /// Answer a request through the cache
    pub async fn optimize_request(
        &self,
        request_key: &str,
        payload: Option<&serde_json::Value>,
    ) -> EdgeResult<OptimizedResponse> {
        self.optimizer.optimize(request_key, payload).await
    }

    /// Snapshot of every counter
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            nodes: NodeMetrics::from_counts(&self.registry.status_counts()),
            clusters: self.registry.list_clusters().len(),
            workloads: WorkloadMetrics::from_counts(
                &self.scheduler.status_counts(),
                self.scheduler.stats(),
            ),
            cache: self.cache.stats(),
            compression: self.compression.stats(),
            optimizer: self.optimizer.stats(),
        }
    }
}

impl std::fmt::Debug for EdgeSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeSystem")
            .field("nodes", &self.registry.len())
            .field("workloads", &self.scheduler.len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EdgeError;

    #[test]
    fn test_invalid_config_is_fatal() {
        let config = EdgeConfig::new().heartbeat_timeout(Duration::from_secs(1));
        assert!(matches!(
            EdgeSystem::new(config),
            Err(EdgeError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let system = EdgeSystem::new(EdgeConfig::default()).unwrap();
        assert!(!system.is_running());
        system.start();
        system.start();
        assert!(system.is_running());
        assert_eq!(system.stop().await, 0);
        assert!(!system.is_running());
    }

    #[tokio::test]
    async fn test_echo_optimizer() {
        let system = EdgeSystem::new(EdgeConfig::default()).unwrap();
        let payload = serde_json::json!({ "q": 1 });
        let response = system.optimize_request("/status", Some(&payload)).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&response.data).unwrap();
        assert_eq!(body["request"], "/status");
        assert_eq!(body["payload"]["q"], 1);
    }
}
