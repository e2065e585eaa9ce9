mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use topology_coordination::api::{
    BrokersPatch, ClusterChangeResponse, ClusterPatchRequest, JoinPartitionRequest,
    ManagementRequest, ManagementResponse, PartitionsPatch, RemoveMembersRequest, ScaleRequest,
};
use topology_coordination::client::{ClientConfig, ManagementClient};
use topology_coordination::error::{Error, ErrorCode};
use topology_coordination::executor::Executors;
use topology_coordination::planner::RequestPlanner;
use topology_coordination::serializer::JsonSerializer;
use topology_coordination::service::ManagementService;
use topology_coordination::store::InMemoryTopologyStore;
use topology_coordination::topology::{ClusterTopology, MemberId, MemberState, TopologyChangeOperation};
use topology_coordination::transport::LocalTransport;

const COORDINATOR: &str = "coordinator";

async fn client_for(service: Arc<ManagementService>) -> ManagementClient {
    let transport = Arc::new(LocalTransport::new(
        Arc::new(JsonSerializer),
        Duration::from_millis(10),
    ));
    transport.register(MemberId::from(COORDINATOR), service).await;
    ManagementClient::new(
        transport,
        ClientConfig {
            target: MemberId::from(COORDINATOR),
            request_timeout: Duration::from_secs(2),
            poll_interval: POLL_INTERVAL,
        },
    )
}

fn cluster_change(response: ManagementResponse) -> ClusterChangeResponse {
    match response {
        ManagementResponse::ClusterChange(change) => change,
        ManagementResponse::Topology(_) => panic!("expected a cluster change response"),
    }
}

fn scale_to(members: BTreeSet<MemberId>) -> ScaleRequest {
    ScaleRequest {
        members,
        replication_factor: None,
        dry_run: false,
        force: false,
    }
}

#[tokio::test]
async fn scale_up_hands_a_partition_to_the_new_member() {
    let seeded = ClusterTopology::init().add_member("1", owning(&[(1, 1), (2, 1)]));
    let store = Arc::new(InMemoryTopologyStore::with_topology(seeded.clone()));
    let recorder = Arc::new(RecordingExecutor::default());
    let (service, _coordinator) = start_service(store, recorder.executors()).await;
    let client = client_for(service).await;

    let response = client.scale(scale_to(ids(&["1", "2"]))).await.unwrap();
    assert_eq!(
        response.planned_changes,
        vec![
            TopologyChangeOperation::member_join("2"),
            TopologyChangeOperation::partition_join("2", 2, 1),
            TopologyChangeOperation::partition_leave("1", 2),
        ]
    );
    assert_eq!(response.current_topology, seeded);
    assert_eq!(response.change_id, seeded.version + 1);

    let done = client
        .await_completion(response.change_id, WAIT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        placement(&done),
        BTreeMap::from([
            (MemberId::from("1"), BTreeMap::from([(1, 1)])),
            (MemberId::from("2"), BTreeMap::from([(2, 1)])),
        ])
    );
    assert_eq!(placement(&done), placement(&response.expected_topology));
    assert_eq!(
        recorder.events().await,
        vec![
            ExecutorEvent::AddMember("2".into()),
            ExecutorEvent::join("2", 2, 1),
            ExecutorEvent::leave("1", 2),
        ]
    );
}

#[tokio::test]
async fn scaling_up_matches_a_fresh_distribution() {
    let planner = RequestPlanner::default();
    let seeded = planner.initial_topology(&numbered(3), 6, 3).unwrap();
    let fresh = planner.initial_topology(&numbered(4), 6, 3).unwrap();
    let store = Arc::new(InMemoryTopologyStore::with_topology(seeded));
    let (service, coordinator) = start_service(store, Executors::noop()).await;

    let response = cluster_change(
        service
            .handle(ManagementRequest::Scale(scale_to(numbered(4))))
            .await
            .unwrap(),
    );
    let done = coordinator
        .await_change_completion(response.change_id)
        .await
        .unwrap();

    assert_eq!(placement(&done), placement(&fresh));
    assert!(done.members.values().all(MemberState::is_active));
}

#[tokio::test]
async fn scaling_down_removes_members_after_moving_their_partitions() {
    let planner = RequestPlanner::default();
    let seeded = planner.initial_topology(&numbered(3), 6, 2).unwrap();
    let store = Arc::new(InMemoryTopologyStore::with_topology(seeded));
    let (service, coordinator) = start_service(store, Executors::noop()).await;

    let response = cluster_change(
        service
            .handle(ManagementRequest::Scale(scale_to(numbered(2))))
            .await
            .unwrap(),
    );
    assert_eq!(
        response.planned_changes.last(),
        Some(&TopologyChangeOperation::member_leave("2"))
    );

    let done = coordinator
        .await_change_completion(response.change_id)
        .await
        .unwrap();
    let removed = done.member(&"2".into()).unwrap();
    assert!(removed.has_left());
    assert!(removed.partitions.is_empty());
    assert_eq!(
        placement(&done),
        placement(&planner.initial_topology(&numbered(2), 6, 2).unwrap())
    );
}

#[tokio::test]
async fn remove_members_in_request_order() {
    let seeded = ClusterTopology::init()
        .add_member("1", MemberState::active(BTreeMap::new()))
        .add_member("2", MemberState::active(BTreeMap::new()));
    let store = Arc::new(InMemoryTopologyStore::with_topology(seeded));
    let (service, coordinator) = start_service(store, Executors::noop()).await;

    let response = cluster_change(
        service
            .handle(ManagementRequest::RemoveMembers(RemoveMembersRequest {
                members: vec!["1".into(), "2".into()],
                dry_run: false,
            }))
            .await
            .unwrap(),
    );
    assert_eq!(
        response.planned_changes,
        vec![
            TopologyChangeOperation::member_leave("1"),
            TopologyChangeOperation::member_leave("2"),
        ]
    );

    let done = coordinator
        .await_change_completion(response.change_id)
        .await
        .unwrap();
    assert!(done.members.values().all(MemberState::has_left));
    assert!(done.current_members().is_empty());
}

#[tokio::test]
async fn join_on_empty_topology_is_rejected() {
    let store = Arc::new(InMemoryTopologyStore::new());
    let (service, coordinator) = start_service(store.clone(), Executors::noop()).await;

    let reply = service
        .handle_reply(ManagementRequest::JoinPartition(JoinPartitionRequest {
            member: "1".into(),
            partition: 1,
            priority: 3,
            dry_run: false,
        }))
        .await;
    let error = reply.unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidRequest);
    assert!(
        error.message.contains("partition has no active members"),
        "unexpected message: {}",
        error.message
    );

    assert_eq!(*coordinator.get_current_topology(), ClusterTopology::init());
    assert_eq!(persisted(&store).await, None);
}

#[tokio::test]
async fn dry_run_patch_leaves_the_topology_untouched() {
    let planner = RequestPlanner::default();
    let seeded = planner.initial_topology(&numbered(2), 4, 1).unwrap();
    let store = Arc::new(InMemoryTopologyStore::with_topology(seeded.clone()));
    let (service, _coordinator) = start_service(store.clone(), Executors::noop()).await;
    let client = client_for(service).await;

    let response = client
        .patch_cluster(ClusterPatchRequest {
            brokers: BrokersPatch {
                count: Some(3),
                ..Default::default()
            },
            partitions: PartitionsPatch::default(),
            dry_run: true,
        })
        .await
        .unwrap();

    assert!(!response.is_empty());
    assert_eq!(response.change_id, seeded.version);
    assert_eq!(response.current_topology, seeded);
    assert_eq!(
        placement(&response.expected_topology),
        placement(&planner.initial_topology(&numbered(3), 4, 1).unwrap())
    );
    assert_eq!(client.get_topology().await.unwrap(), seeded);
    assert_eq!(persisted(&store).await, Some(seeded));
}

#[tokio::test]
async fn patch_cannot_change_the_partition_count() {
    let planner = RequestPlanner::default();
    let seeded = planner.initial_topology(&numbered(2), 4, 1).unwrap();
    let store = Arc::new(InMemoryTopologyStore::with_topology(seeded.clone()));
    let (service, _coordinator) = start_service(store, Executors::noop()).await;
    let client = client_for(service).await;

    let err = client
        .patch_cluster(ClusterPatchRequest {
            partitions: PartitionsPatch {
                count: Some(8),
                replication_factor: None,
            },
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");
    assert_eq!(client.get_topology().await.unwrap(), seeded);
}

#[tokio::test]
async fn concurrent_request_is_rejected_until_the_change_finishes() {
    let seeded = ClusterTopology::init()
        .add_member("1", owning(&[(1, 1)]))
        .add_member("2", MemberState::active(BTreeMap::new()));
    let store = Arc::new(InMemoryTopologyStore::with_topology(seeded));
    let gated = GatedPartitionExecutor::new();
    let (service, _coordinator) = start_service(store, with_partitions(gated.clone())).await;
    let client = client_for(service).await;

    let first = client
        .join_partition("2".into(), 1, 2, false)
        .await
        .unwrap();
    gated.wait_until_blocked().await;

    let err = client
        .add_members(ids(&["3"]), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrentChange { .. }), "got {err:?}");

    // A dry run is rejected as well; it would plan against a moving target.
    let err = client.add_members(ids(&["3"]), true).await.unwrap_err();
    assert!(matches!(err, Error::ConcurrentChange { .. }), "got {err:?}");

    gated.release(1);
    client
        .await_completion(first.change_id, WAIT_TIMEOUT)
        .await
        .unwrap();

    let second = client.add_members(ids(&["3"]), false).await.unwrap();
    let done = client
        .await_completion(second.change_id, WAIT_TIMEOUT)
        .await
        .unwrap();
    assert!(done.member(&"3".into()).unwrap().is_active());
}

#[tokio::test]
async fn reassigning_a_balanced_cluster_plans_nothing() {
    let planner = RequestPlanner::default();
    let seeded = planner.initial_topology(&numbered(3), 6, 2).unwrap();
    let store = Arc::new(InMemoryTopologyStore::with_topology(seeded.clone()));
    let (service, _coordinator) = start_service(store, Executors::noop()).await;
    let client = client_for(service).await;

    let response = client
        .reassign_partitions(numbered(3), false)
        .await
        .unwrap();
    assert!(response.is_empty());
    assert_eq!(response.change_id, seeded.version);
    assert!(!client.get_topology().await.unwrap().has_pending_changes());
}

#[tokio::test]
async fn cancel_through_the_client() {
    let seeded = ClusterTopology::init()
        .add_member("1", owning(&[(1, 1)]))
        .add_member("2", MemberState::active(BTreeMap::new()));
    let store = Arc::new(InMemoryTopologyStore::with_topology(seeded));
    let gated = GatedPartitionExecutor::new();
    let (service, _coordinator) = start_service(store, with_partitions(gated.clone())).await;
    let client = client_for(service).await;

    let started = client
        .join_partition("2".into(), 1, 1, false)
        .await
        .unwrap();
    gated.wait_until_blocked().await;

    let cancelled = client.cancel_change(started.change_id).await.unwrap();
    assert!(!cancelled.has_pending_changes());
    assert!(cancelled.has_completed_changes(started.change_id));

    let err = client.cancel_change(started.change_id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "got {err:?}");
    gated.release(1);
}

#[tokio::test]
async fn requests_wait_for_a_coordinator_to_be_installed() {
    let service = Arc::new(ManagementService::new(RequestPlanner::default()));
    let client = client_for(Arc::clone(&service)).await;

    let err = client.get_topology().await.unwrap_err();
    assert!(matches!(err, Error::TransportTimeout(_)), "got {err:?}");

    let store = Arc::new(InMemoryTopologyStore::new());
    service
        .install(start_coordinator(store, Executors::noop()).await)
        .await;
    assert_eq!(client.get_topology().await.unwrap(), ClusterTopology::init());
}
