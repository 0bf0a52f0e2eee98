//! Injected units of execution for workloads.
//!
//! The scheduler never runs real compute. It hands each placed workload to a
//! [`WorkloadExecutor`] supplied at construction time and records whatever
//! the executor returns.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::json;

use crate::node::NodeId;
use crate::resource::ResourceRequirement;
use crate::workload::{WorkloadId, WorkloadPriority};

/// Everything an executor gets to know about the work it runs
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Workload being executed
    pub workload_id: WorkloadId,
    /// Workload name
    pub name: String,
    /// Workload priority
    pub priority: WorkloadPriority,
    /// Requested resources
    pub requirement: ResourceRequirement,
    /// Opaque payload from the submitter
    pub payload: serde_json::Value,
    /// Node the workload was placed on
    pub node_id: NodeId,
}

/// Runs the work of a placed workload
#[async_trait]
pub trait WorkloadExecutor: Send + Sync {
    /// Execute the workload and return its result
    async fn execute(&self, context: ExecutionContext) -> anyhow::Result<serde_json::Value>;
}

/// Sleeps for a base duration scaled by priority, then reports what it did
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    base_duration: Duration,
}

impl SimulatedExecutor {
    /// Create a simulated executor with the given base duration
    pub fn new(base_duration: Duration) -> Self {
        Self { base_duration }
    }

    /// Simulated run time for a priority
    pub fn duration_for(&self, priority: WorkloadPriority) -> Duration {
        let millis = self.base_duration.as_millis() as f64 * priority.duration_factor();
        Duration::from_millis(millis.round() as u64)
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl WorkloadExecutor for SimulatedExecutor {
    async fn execute(&self, context: ExecutionContext) -> anyhow::Result<serde_json::Value> {
        let duration = self.duration_for(context.priority);
        tokio::time::sleep(duration).await;
        Ok(json!({
            "workload": context.name,
            "node": context.node_id.to_string(),
            "processing_ms": duration.as_millis() as u64,
        }))
    }
}

/// Adapts a closure into an executor
pub struct FnExecutor<F> {
    func: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(ExecutionContext) -> BoxFuture<'static, anyhow::Result<serde_json::Value>> + Send + Sync,
{
    /// Wrap a closure returning a boxed future
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> WorkloadExecutor for FnExecutor<F>
where
    F: Fn(ExecutionContext) -> BoxFuture<'static, anyhow::Result<serde_json::Value>> + Send + Sync,
{
    async fn execute(&self, context: ExecutionContext) -> anyhow::Result<serde_json::Value> {
        (self.func)(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn context(priority: WorkloadPriority) -> ExecutionContext {
        ExecutionContext {
            workload_id: WorkloadId::new(),
            name: "job".to_string(),
            priority,
            requirement: ResourceRequirement::new(1.0, 1.0),
            payload: serde_json::Value::Null,
            node_id: NodeId::new(),
        }
    }

    #[test]
    fn test_simulated_duration_scales_with_priority() {
        let executor = SimulatedExecutor::new(Duration::from_millis(1000));
        assert_eq!(
            executor.duration_for(WorkloadPriority::RealTime),
            Duration::from_millis(500)
        );
        assert_eq!(
            executor.duration_for(WorkloadPriority::High),
            Duration::from_millis(700)
        );
        assert_eq!(
            executor.duration_for(WorkloadPriority::Normal),
            Duration::from_millis(1000)
        );
        assert_eq!(
            executor.duration_for(WorkloadPriority::Low),
            Duration::from_millis(1500)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_executor_reports_node() {
        let executor = SimulatedExecutor::new(Duration::from_millis(10));
        let ctx = context(WorkloadPriority::Normal);
        let node = ctx.node_id.to_string();
        let result = executor.execute(ctx).await.unwrap();
        assert_eq!(result["node"], json!(node));
        assert_eq!(result["processing_ms"], json!(10));
    }

    #[tokio::test]
    async fn test_fn_executor() {
        let executor = FnExecutor::new(|ctx: ExecutionContext| {
            async move { Ok(json!({ "echo": ctx.name })) }.boxed()
        });
        let result = executor.execute(context(WorkloadPriority::Low)).await.unwrap();
        assert_eq!(result, json!({ "echo": "job" }));
    }
}
