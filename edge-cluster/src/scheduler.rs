//! Priority-ordered workload scheduler.
//!
//! The scheduler owns the workload table. A scheduling cycle walks Pending
//! workloads from the most to the least urgent, asks the placement policy for
//! a node among the suitable ones and commits the reservation through the
//! registry, which re-validates the node under its own lock. Placed workloads
//! run on the injected [`WorkloadExecutor`] in their own task, so a cycle never
//! waits for execution.
//!
//! Lock order is always scheduler state first, registry second.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SchedulerConfig;
use crate::error::{EdgeError, EdgeResult};
use crate::executor::{ExecutionContext, WorkloadExecutor};
use crate::node::{NodeId, NodeStatus};
use crate::placement::PlacementPolicy;
use crate::registry::NodeRegistry;
use crate::resource::{ResourceRequirement, ResourceShare};
use crate::workload::{EdgeWorkload, WorkloadId, WorkloadStatus, WorkloadStatusRecord};

/// Workload counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Workloads accepted by `submit`
    pub submitted: u64,
    /// Workloads placed on a node
    pub placed: u64,
    /// Executions that finished successfully
    pub completed: u64,
    /// Executions that failed or timed out
    pub failed: u64,
    /// Workloads cancelled for any reason
    pub cancelled: u64,
    /// Pending workloads that outlived `max_pending_age`
    pub expired: u64,
    /// Finished workloads dropped from the table
    pub pruned: u64,
    /// Mean processing time of completed workloads
    #[serde(with = "duration_millis")]
    pub average_processing_time: Duration,
    #[serde(skip)]
    total_processing_time: Duration,
}

impl SchedulerStats {
    fn record_completion(&mut self, processing_time: Duration) {
        self.completed += 1;
        self.total_processing_time += processing_time;
        let mean_nanos = self.total_processing_time.as_nanos() / u128::from(self.completed);
        self.average_processing_time =
            Duration::from_nanos(u64::try_from(mean_nanos).unwrap_or(u64::MAX));
    }
}

/// Outcome of one scheduling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Workloads placed and started, in placement order
    pub placed: Vec<WorkloadId>,
    /// Workloads left Pending for lack of a suitable node
    pub deferred: usize,
    /// Workloads moved to Error for waiting too long
    pub expired: usize,
    /// Finished workloads pruned from the table
    pub pruned: usize,
}

#[derive(Default)]
struct SchedulerState {
    workloads: HashMap<WorkloadId, EdgeWorkload>,
    running: HashMap<WorkloadId, AbortHandle>,
    stats: SchedulerStats,
}

/// Places workloads on edge nodes and tracks their lifecycle
pub struct WorkloadScheduler {
    registry: Arc<NodeRegistry>,
    executor: Arc<dyn WorkloadExecutor>,
    policy: Box<dyn PlacementPolicy>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    next_sequence: AtomicU64,
}

impl WorkloadScheduler {
    /// Create a scheduler placing onto `registry` and running on `executor`
    pub fn new(
        registry: Arc<NodeRegistry>,
        executor: Arc<dyn WorkloadExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        let policy = config.placement.policy();
        Self {
            registry,
            executor,
            policy,
            config,
            state: Mutex::new(SchedulerState::default()),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Accept a workload. It gets a fresh ID and starts Pending.
    pub fn submit(&self, mut workload: EdgeWorkload) -> WorkloadId {
        let id = WorkloadId::new();
        workload.id = id;
        workload.status = WorkloadStatus::Pending;
        workload.assigned_node = None;
        workload.reservation = None;
        workload.created_at = Utc::now();
        workload.started_at = None;
        workload.completed_at = None;
        workload.result = None;
        workload.error = None;
        workload.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        workload.submitted = Instant::now();
        workload.started = None;
        workload.finished = None;

        info!(
            "Submitted workload {} ({}) with {:?} priority",
            workload.name, id, workload.priority
        );
        let mut state = self.state.lock();
        state.stats.submitted += 1;
        state.workloads.insert(id, workload);
        id
    }

    /// Status record of a workload
    pub fn status(&self, workload_id: &WorkloadId) -> Option<WorkloadStatusRecord> {
        self.state
            .lock()
            .workloads
            .get(workload_id)
            .map(EdgeWorkload::status_record)
    }

    /// Snapshot of a workload
    pub fn workload(&self, workload_id: &WorkloadId) -> Option<EdgeWorkload> {
        self.state.lock().workloads.get(workload_id).cloned()
    }

    /// Number of workloads in the table
    pub fn len(&self) -> usize {
        self.state.lock().workloads.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().workloads.is_empty()
    }

    /// Number of workloads per status
    pub fn status_counts(&self) -> HashMap<WorkloadStatus, usize> {
        let state = self.state.lock();
        let mut counts = HashMap::new();
        for workload in state.workloads.values() {
            *counts.entry(workload.status).or_insert(0) += 1;
        }
        counts
    }

    /// Current counters
    pub fn stats(&self) -> SchedulerStats {
        self.state.lock().stats.clone()
    }

    /// Run one scheduling cycle.
    ///
    /// Must be called from within a tokio runtime, placed workloads are
    /// spawned onto it.
    pub fn run_cycle(self: &Arc<Self>) -> CycleReport {
        let mut report = CycleReport {
            expired: self.expire_pending(),
            ..CycleReport::default()
        };
        if let Some(retention) = self.config.terminal_retention {
            report.pruned = self.prune_terminal_workloads(retention);
        }

        for (workload_id, requirement) in self.pending_in_order() {
            let candidates = self.registry.suitable_nodes(&requirement);
            let chosen = self.policy.select(&candidates).and_then(|node_id| {
                candidates
                    .iter()
                    .find(|c| c.node_id == node_id)
                    .map(|c| (node_id, c.share))
            });
            let Some((node_id, share)) = chosen else {
                debug!("No suitable node for workload {}, leaving it pending", workload_id);
                report.deferred += 1;
                continue;
            };

            match self.place(workload_id, node_id, share) {
                Ok(Some(context)) => {
                    report.placed.push(workload_id);
                    self.spawn_execution(context);
                }
                // Cancelled since the pending snapshot was taken
                Ok(None) => {}
                Err(e) => {
                    debug!("Placement of workload {} on {} failed: {}", workload_id, node_id, e);
                    report.deferred += 1;
                }
            }
        }
        report
    }

    /// Run scheduling cycles every `scheduling_interval` until `shutdown`
    /// flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.scheduling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Workload scheduler started ({} placement, every {:?})",
            self.policy.name(),
            self.config.scheduling_interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle();
                    if !report.placed.is_empty() {
                        debug!(
                            "Scheduling cycle placed {} workload(s), {} deferred",
                            report.placed.len(),
                            report.deferred
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Workload scheduler stopped");
    }

    /// Cancel a workload that has not finished yet, releasing its reservation
    pub fn cancel_workload(&self, workload_id: &WorkloadId) -> EdgeResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let workload = state
            .workloads
            .get_mut(workload_id)
            .ok_or(EdgeError::WorkloadNotFound(*workload_id))?;
        workload.transition(WorkloadStatus::Cancelled)?;
        self.release_reservation(workload);
        if let Some(handle) = state.running.remove(workload_id) {
            handle.abort();
        }
        state.stats.cancelled += 1;
        info!("Cancelled workload {} ({})", workload.name, workload_id);
        Ok(())
    }

    /// Cancel every unfinished workload placed on a node that was removed or
    /// went offline. The workloads lose their node assignment and are not
    /// rescheduled.
    ///
    /// Nothing is cancelled if the node is registered and not Offline, which
    /// happens when a heartbeat lands between expiry and this call.
    pub fn cancel_workloads_on_node(&self, node_id: &NodeId) -> Vec<WorkloadId> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        // Placement needs the scheduler lock, so no new work can land while held
        match self.registry.status(node_id) {
            None | Some(NodeStatus::Offline) => {}
            Some(status) => {
                debug!(
                    "Node {} is {} again, keeping its workloads",
                    node_id, status
                );
                return Vec::new();
            }
        }
        let mut cancelled: Vec<(u64, WorkloadId)> = Vec::new();
        for workload in state.workloads.values_mut() {
            if workload.assigned_node != Some(*node_id) || workload.status.is_terminal() {
                continue;
            }
            if workload.transition(WorkloadStatus::Cancelled).is_err() {
                continue;
            }
            self.release_reservation(workload);
            workload.assigned_node = None;
            if let Some(handle) = state.running.remove(&workload.id) {
                handle.abort();
            }
            cancelled.push((workload.sequence, workload.id));
        }
        state.stats.cancelled += cancelled.len() as u64;
        cancelled.sort();
        for (_, id) in &cancelled {
            warn!("Cancelled workload {}: node {} is gone", id, node_id);
        }
        cancelled.into_iter().map(|(_, id)| id).collect()
    }

    /// Cancel every Running workload and abort its execution
    pub fn cancel_running(&self) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut cancelled = 0;
        for workload in state.workloads.values_mut() {
            if !matches!(workload.status, WorkloadStatus::Assigned | WorkloadStatus::Running) {
                continue;
            }
            if workload.transition(WorkloadStatus::Cancelled).is_ok() {
                self.release_reservation(workload);
                cancelled += 1;
            }
        }
        for (_, handle) in state.running.drain() {
            handle.abort();
        }
        state.stats.cancelled += cancelled as u64;
        if cancelled > 0 {
            info!("Cancelled {} running workload(s)", cancelled);
        }
        cancelled
    }

    /// Drop finished workloads that reached their final status at least
    /// `older_than` ago. Returns how many were removed.
    pub fn prune_terminal_workloads(&self, older_than: Duration) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.workloads.len();
        state.workloads.retain(|_, workload| {
            !(workload.status.is_terminal()
                && workload
                    .finished
                    .map_or(false, |at| now.saturating_duration_since(at) >= older_than))
        });
        let pruned = before - state.workloads.len();
        state.stats.pruned += pruned as u64;
        if pruned > 0 {
            debug!("Pruned {} finished workload(s)", pruned);
        }
        pruned
    }

    fn expire_pending(&self) -> usize {
        let Some(max_age) = self.config.max_pending_age else {
            return 0;
        };
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut expired = 0;
        for workload in state.workloads.values_mut() {
            if workload.status != WorkloadStatus::Pending
                || now.saturating_duration_since(workload.submitted) <= max_age
            {
                continue;
            }
            if workload.transition(WorkloadStatus::Error).is_ok() {
                workload.error = Some(format!("not placed within {:?}", max_age));
                warn!("Workload {} ({}) expired while pending", workload.name, workload.id);
                expired += 1;
            }
        }
        state.stats.expired += expired as u64;
        expired
    }

    fn pending_in_order(&self) -> Vec<(WorkloadId, ResourceRequirement)> {
        let state = self.state.lock();
        let mut pending: Vec<&EdgeWorkload> = state
            .workloads
            .values()
            .filter(|w| w.status == WorkloadStatus::Pending)
            .collect();
        pending.sort_by_key(|w| (Reverse(w.priority), w.sequence));
        pending
            .into_iter()
            .map(|w| (w.id, w.requirement))
            .collect()
    }

    /// Reserve `share` on the node and move the workload to Running.
    /// `Ok(None)` means the workload is no longer Pending.
    fn place(
        &self,
        workload_id: WorkloadId,
        node_id: NodeId,
        share: ResourceShare,
    ) -> EdgeResult<Option<ExecutionContext>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(workload) = state.workloads.get_mut(&workload_id) else {
            return Ok(None);
        };
        if workload.status != WorkloadStatus::Pending {
            return Ok(None);
        }

        self.registry.reserve(&node_id, workload_id, &share)?;
        workload.assigned_node = Some(node_id);
        workload.reservation = Some(share);
        workload.transition(WorkloadStatus::Assigned)?;
        workload.transition(WorkloadStatus::Running)?;
        workload.started_at = Some(Utc::now());
        workload.started = Some(Instant::now());
        state.stats.placed += 1;

        info!(
            "Placed workload {} ({}) on node {} via {}",
            workload.name,
            workload_id,
            node_id,
            self.policy.name()
        );
        Ok(Some(ExecutionContext {
            workload_id,
            name: workload.name.clone(),
            priority: workload.priority,
            requirement: workload.requirement,
            payload: workload.payload.clone(),
            node_id,
        }))
    }

    fn spawn_execution(self: &Arc<Self>, context: ExecutionContext) {
        let workload_id = context.workload_id;
        let scheduler = Arc::clone(self);
        let executor = Arc::clone(&self.executor);
        let timeout = self.config.execution_timeout;

        let handle = tokio::spawn(async move {
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, executor.execute(context)).await {
                    Ok(result) => result.map_err(EdgeError::from),
                    Err(_) => Err(EdgeError::ExecutionTimeout(limit)),
                },
                None => executor.execute(context).await.map_err(EdgeError::from),
            };
            scheduler.finish(workload_id, outcome);
        });

        let mut state = self.state.lock();
        // The task may already have finished
        let still_running = state
            .workloads
            .get(&workload_id)
            .map_or(false, |w| w.status == WorkloadStatus::Running);
        if still_running {
            state.running.insert(workload_id, handle.abort_handle());
        }
    }

    fn finish(&self, workload_id: WorkloadId, outcome: EdgeResult<serde_json::Value>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.running.remove(&workload_id);
        let Some(workload) = state.workloads.get_mut(&workload_id) else {
            return;
        };
        if workload.status != WorkloadStatus::Running {
            debug!(
                "Dropping execution result of workload {}, it is already {}",
                workload_id, workload.status
            );
            return;
        }

        let finished = match outcome {
            Ok(value) => workload.transition(WorkloadStatus::Completed).map(|_| {
                workload.result = Some(value);
            }),
            Err(e) => workload.transition(WorkloadStatus::Error).map(|_| {
                workload.error = Some(e.to_string());
            }),
        };
        if let Err(e) = finished {
            error!("Could not record outcome of workload {}: {}", workload_id, e);
            return;
        }
        self.release_reservation(workload);

        match workload.status {
            WorkloadStatus::Completed => {
                let processing_time = workload.processing_time().unwrap_or_default();
                state.stats.record_completion(processing_time);
                info!(
                    "Workload {} ({}) completed in {:?}",
                    workload.name, workload_id, processing_time
                );
            }
            _ => {
                state.stats.failed += 1;
                warn!(
                    "Workload {} ({}) failed: {}",
                    workload.name,
                    workload_id,
                    workload.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    fn release_reservation(&self, workload: &mut EdgeWorkload) {
        if let (Some(node_id), Some(share)) = (workload.assigned_node, workload.reservation.take()) {
            if !self.registry.release(&node_id, &workload.id, &share) {
                debug!(
                    "Node {} no longer holds a reservation for workload {}",
                    node_id, workload.id
                );
            }
        }
    }
}

impl std::fmt::Debug for WorkloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadScheduler")
            .field("policy", &self.policy.name())
            .field("config", &self.config)
            .field("workloads", &self.len())
            .finish()
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FnExecutor;
    use crate::node::{EdgeNode, NodeType};
    use crate::resource::ResourceCapacity;
    use crate::workload::WorkloadPriority;
    use futures::FutureExt;
    use serde_json::json;

    fn instant_executor() -> Arc<dyn WorkloadExecutor> {
        Arc::new(FnExecutor::new(|ctx: ExecutionContext| {
            async move { Ok(json!({ "ran": ctx.name })) }.boxed()
        }))
    }

    fn failing_executor() -> Arc<dyn WorkloadExecutor> {
        Arc::new(FnExecutor::new(|_ctx: ExecutionContext| {
            async move { Err(anyhow::anyhow!("disk on fire")) }.boxed()
        }))
    }

    fn setup(executor: Arc<dyn WorkloadExecutor>) -> (Arc<NodeRegistry>, Arc<WorkloadScheduler>) {
        let registry = Arc::new(NodeRegistry::new());
        let scheduler = Arc::new(WorkloadScheduler::new(
            registry.clone(),
            executor,
            SchedulerConfig::default(),
        ));
        (registry, scheduler)
    }

    fn node() -> EdgeNode {
        EdgeNode::new(
            "edge",
            NodeType::Compute,
            "lab",
            ResourceCapacity::new(4.0, 8.0, 100.0, 100.0),
        )
    }

    fn job(name: &str, cpu: f64) -> EdgeWorkload {
        EdgeWorkload::new(name, WorkloadPriority::Normal, ResourceRequirement::new(cpu, 1.0))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_submit_starts_pending() {
        let (_, scheduler) = setup(instant_executor());
        let id = scheduler.submit(job("a", 1.0));
        let record = scheduler.status(&id).unwrap();
        assert_eq!(record.status, WorkloadStatus::Pending);
        assert!(record.assigned_node.is_none());
        assert_eq!(scheduler.stats().submitted, 1);
    }

    #[tokio::test]
    async fn test_cycle_places_and_completes() {
        let (registry, scheduler) = setup(instant_executor());
        let node_id = registry.add_node(node()).unwrap();
        let id = scheduler.submit(job("a", 2.0));

        let report = scheduler.run_cycle();
        assert_eq!(report.placed, vec![id]);
        settle().await;

        let record = scheduler.status(&id).unwrap();
        assert_eq!(record.status, WorkloadStatus::Completed);
        assert_eq!(record.assigned_node, Some(node_id));
        assert_eq!(record.result, Some(json!({ "ran": "a" })));

        let stored = registry.get(&node_id).unwrap();
        assert_eq!(stored.available().cpu(), 100.0);
        assert!(stored.workloads().is_empty());
        assert_eq!(scheduler.stats().completed, 1);
    }

    #[tokio::test]
    async fn test_executor_failure_moves_to_error() {
        let (registry, scheduler) = setup(failing_executor());
        let node_id = registry.add_node(node()).unwrap();
        let id = scheduler.submit(job("a", 2.0));

        scheduler.run_cycle();
        settle().await;

        let record = scheduler.status(&id).unwrap();
        assert_eq!(record.status, WorkloadStatus::Error);
        assert!(record.error.unwrap().contains("disk on fire"));
        assert_eq!(registry.get(&node_id).unwrap().available().cpu(), 100.0);
        assert_eq!(scheduler.stats().failed, 1);
    }

    #[test]
    fn test_average_survives_u32_overflow_of_completions() {
        let mut stats = SchedulerStats {
            completed: u64::from(u32::MAX),
            total_processing_time: Duration::from_secs(u64::from(u32::MAX)),
            ..SchedulerStats::default()
        };
        stats.record_completion(Duration::from_secs(1));
        assert_eq!(stats.completed, 1 << 32);
        assert_eq!(stats.average_processing_time, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_back_online_keeps_new_placements() {
        let (registry, scheduler) = setup(Arc::new(FnExecutor::new(|_ctx: ExecutionContext| {
            futures::future::pending::<anyhow::Result<serde_json::Value>>().boxed()
        })));
        let node_id = registry.add_node(node()).unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.expire_heartbeats(Duration::from_secs(60)), vec![node_id]);

        // Heartbeat and a new placement land before the cancellation sweep
        assert!(registry.heartbeat(&node_id));
        let id = scheduler.submit(job("fresh", 1.0));
        scheduler.run_cycle();
        assert_eq!(scheduler.status(&id).unwrap().status, WorkloadStatus::Running);

        assert!(scheduler.cancel_workloads_on_node(&node_id).is_empty());
        let record = scheduler.status(&id).unwrap();
        assert_eq!(record.status, WorkloadStatus::Running);
        assert_eq!(record.assigned_node, Some(node_id));
        assert_eq!(registry.get(&node_id).unwrap().workloads(), &[id]);
    }

    #[tokio::test]
    async fn test_no_node_defers() {
        let (_, scheduler) = setup(instant_executor());
        let id = scheduler.submit(job("a", 1.0));
        let report = scheduler.run_cycle();
        assert_eq!(report.deferred, 1);
        assert_eq!(scheduler.status(&id).unwrap().status, WorkloadStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_pending_and_terminal() {
        let (_, scheduler) = setup(instant_executor());
        let id = scheduler.submit(job("a", 1.0));
        scheduler.cancel_workload(&id).unwrap();
        assert_eq!(scheduler.status(&id).unwrap().status, WorkloadStatus::Cancelled);
        assert!(matches!(
            scheduler.cancel_workload(&id),
            Err(EdgeError::InvalidWorkloadTransition { .. })
        ));
        assert!(matches!(
            scheduler.cancel_workload(&WorkloadId::new()),
            Err(EdgeError::WorkloadNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_expiry() {
        let registry = Arc::new(NodeRegistry::new());
        let config = SchedulerConfig {
            max_pending_age: Some(Duration::from_secs(30)),
            ..SchedulerConfig::default()
        };
        let scheduler = Arc::new(WorkloadScheduler::new(registry, instant_executor(), config));
        let id = scheduler.submit(job("a", 1.0));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(scheduler.run_cycle().expired, 0);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(scheduler.run_cycle().expired, 1);
        let record = scheduler.status(&id).unwrap();
        assert_eq!(record.status, WorkloadStatus::Error);
        assert!(record.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_terminal_workloads() {
        let (_, scheduler) = setup(instant_executor());
        let done = scheduler.submit(job("done", 1.0));
        let waiting = scheduler.submit(job("waiting", 1.0));
        scheduler.cancel_workload(&done).unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(scheduler.prune_terminal_workloads(Duration::from_secs(60)), 0);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(scheduler.prune_terminal_workloads(Duration::from_secs(60)), 1);

        assert!(scheduler.status(&done).is_none());
        assert!(scheduler.status(&waiting).is_some());
        assert_eq!(scheduler.stats().pruned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_timeout_releases_resources() {
        let registry = Arc::new(NodeRegistry::new());
        let node_id = registry.add_node(node()).unwrap();
        let slow: Arc<dyn WorkloadExecutor> = Arc::new(FnExecutor::new(|_ctx: ExecutionContext| {
            async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(serde_json::Value::Null)
            }
            .boxed()
        }));
        let config = SchedulerConfig {
            execution_timeout: Some(Duration::from_secs(5)),
            ..SchedulerConfig::default()
        };
        let scheduler = Arc::new(WorkloadScheduler::new(registry.clone(), slow, config));
        let id = scheduler.submit(job("slow", 2.0));

        scheduler.run_cycle();
        settle().await;
        assert_eq!(registry.get(&node_id).unwrap().available().cpu(), 50.0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;

        let record = scheduler.status(&id).unwrap();
        assert_eq!(record.status, WorkloadStatus::Error);
        assert_eq!(registry.get(&node_id).unwrap().available().cpu(), 100.0);
    }
}
