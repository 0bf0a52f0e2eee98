// Tests for heartbeat timeouts and their effect on running workloads

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{node, settle, system_with, workload, PendingExecutor};
use edge_cluster::prelude::*;
use edge_cluster::NodeEvent;
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::test(start_paused = true)]
async fn test_silent_node_goes_offline_and_cancels_work() {
    let system = system_with(EdgeConfig::default(), Arc::new(PendingExecutor));
    let mut events = system.subscribe_node_events();
    let node_id = NodeId::new();
    assert!(system.add_edge_node(node("edge-1", 4.0, 8.0).with_id(node_id)));
    let id = system.submit_workload(workload("stream", WorkloadPriority::High, 1.0, 1.0));

    system.start();
    settle().await;
    assert_eq!(system.workload_status(&id).unwrap().status, WorkloadStatus::Running);

    // Heartbeats every 10s for 30s, then silence
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(system.heartbeat(&node_id));
    }

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(system.node(&node_id).unwrap().status(), NodeStatus::Online);

    // The next health check after the 60s deadline catches it
    tokio::time::sleep(Duration::from_secs(35)).await;
    settle().await;
    assert_eq!(system.node(&node_id).unwrap().status(), NodeStatus::Offline);

    let record = system.workload_status(&id).unwrap();
    assert_eq!(record.status, WorkloadStatus::Cancelled);
    assert!(record.assigned_node.is_none());
    let stored = system.node(&node_id).unwrap();
    assert!(stored.workloads().is_empty());
    assert_eq!(stored.available().cpu(), 100.0);

    // More checks do not report the node again
    tokio::time::sleep(Duration::from_secs(120)).await;
    settle().await;

    let mut offline_events = 0;
    loop {
        match events.try_recv() {
            Ok(NodeEvent::Offline(id)) => {
                assert_eq!(id, node_id);
                offline_events += 1;
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("unexpected channel state: {:?}", e),
        }
    }
    assert_eq!(offline_events, 1);

    system.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_brings_node_back_without_rescheduling() {
    let system = system_with(EdgeConfig::default(), Arc::new(PendingExecutor));
    let node_id = NodeId::new();
    system.add_edge_node(node("edge-2", 4.0, 8.0).with_id(node_id));
    let id = system.submit_workload(workload("job", WorkloadPriority::Normal, 1.0, 1.0));
    system.run_scheduling_cycle();

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(system.check_health(), vec![node_id]);
    assert!(system.check_health().is_empty());

    assert!(system.heartbeat(&node_id));
    assert_eq!(system.node(&node_id).unwrap().status(), NodeStatus::Online);

    system.run_scheduling_cycle();
    assert_eq!(system.workload_status(&id).unwrap().status, WorkloadStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_offline_node_is_not_placed_on() {
    let system = system_with(EdgeConfig::default(), Arc::new(PendingExecutor));
    let node_id = NodeId::new();
    system.add_edge_node(node("edge-3", 4.0, 8.0).with_id(node_id));

    tokio::time::advance(Duration::from_secs(61)).await;
    system.check_health();

    let id = system.submit_workload(workload("job", WorkloadPriority::RealTime, 1.0, 1.0));
    for _ in 0..3 {
        system.run_scheduling_cycle();
    }
    assert_eq!(system.workload_status(&id).unwrap().status, WorkloadStatus::Pending);

    system.heartbeat(&node_id);
    system.run_scheduling_cycle();
    let record = system.workload_status(&id).unwrap();
    assert_eq!(record.status, WorkloadStatus::Running);
    assert_eq!(record.assigned_node, Some(node_id));
}

#[tokio::test]
async fn test_unknown_node_heartbeat() {
    let system = system_with(EdgeConfig::default(), Arc::new(PendingExecutor));
    assert!(!system.heartbeat(&NodeId::new()));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_between_expiry_and_sweep_keeps_new_work() {
    let system = system_with(EdgeConfig::default(), Arc::new(PendingExecutor));
    let node_id = NodeId::new();
    system.add_edge_node(node("edge-4", 4.0, 8.0).with_id(node_id));

    tokio::time::advance(Duration::from_secs(61)).await;
    let expired = system.registry().expire_heartbeats(Duration::from_secs(60));
    assert_eq!(expired, vec![node_id]);

    assert!(system.heartbeat(&node_id));
    let id = system.submit_workload(workload("fresh", WorkloadPriority::High, 1.0, 1.0));
    system.run_scheduling_cycle();
    assert_eq!(system.workload_status(&id).unwrap().status, WorkloadStatus::Running);

    let cancelled = system.scheduler().cancel_workloads_on_node(&node_id);
    assert!(cancelled.is_empty());

    let record = system.workload_status(&id).unwrap();
    assert_eq!(record.status, WorkloadStatus::Running);
    assert_eq!(record.assigned_node, Some(node_id));
    assert_eq!(system.node(&node_id).unwrap().status(), NodeStatus::Online);
    assert_eq!(system.node(&node_id).unwrap().available().cpu(), 75.0);
}
