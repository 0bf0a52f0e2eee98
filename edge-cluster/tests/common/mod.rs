//! Shared fixtures for edge-cluster integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use edge_cluster::prelude::*;
use edge_cluster::{EchoFetcher, ExecutionContext, WorkloadExecutor};
use parking_lot::Mutex;
use serde_json::json;

/// Install a test logger once per binary
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compute node with the given CPU cores and memory
pub fn node(name: &str, cpu_cores: f64, memory_gb: f64) -> EdgeNode {
    EdgeNode::new(
        name,
        NodeType::Compute,
        "test-site",
        ResourceCapacity::new(cpu_cores, memory_gb, 100.0, 1000.0),
    )
}

/// Workload asking for CPU cores and memory
pub fn workload(name: &str, priority: WorkloadPriority, cpu_cores: f64, memory_gb: f64) -> EdgeWorkload {
    EdgeWorkload::new(name, priority, ResourceRequirement::new(cpu_cores, memory_gb))
}

/// Let spawned tasks run to their next suspension point
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Finishes immediately and records the order in which workloads ran
#[derive(Debug, Default, Clone)]
pub struct RecordingExecutor {
    pub started: Arc<Mutex<Vec<String>>>,
}

impl RecordingExecutor {
    pub fn names(&self) -> Vec<String> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl WorkloadExecutor for RecordingExecutor {
    async fn execute(&self, context: ExecutionContext) -> anyhow::Result<serde_json::Value> {
        self.started.lock().push(context.name.clone());
        Ok(json!({ "done": context.name }))
    }
}

/// Never finishes, so placed workloads stay Running
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingExecutor;

#[async_trait]
impl WorkloadExecutor for PendingExecutor {
    async fn execute(&self, _context: ExecutionContext) -> anyhow::Result<serde_json::Value> {
        futures::future::pending::<()>().await;
        Ok(serde_json::Value::Null)
    }
}

/// Sleeps for a fixed duration before finishing
#[derive(Debug, Clone, Copy)]
pub struct SleepExecutor(pub Duration);

#[async_trait]
impl WorkloadExecutor for SleepExecutor {
    async fn execute(&self, _context: ExecutionContext) -> anyhow::Result<serde_json::Value> {
        tokio::time::sleep(self.0).await;
        Ok(json!({ "slept_ms": self.0.as_millis() as u64 }))
    }
}

/// System with the given config and executor, echoing requests
pub fn system_with(config: EdgeConfig, executor: Arc<dyn WorkloadExecutor>) -> EdgeSystem {
    init_logging();
    EdgeSystem::with_components(config, executor, Arc::new(EchoFetcher)).unwrap()
}
