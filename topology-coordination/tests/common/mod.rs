#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use topology_coordination::config::CoordinatorConfig;
use topology_coordination::coordinator::ChangeCoordinator;
use topology_coordination::error::{Error, Result};
use topology_coordination::executor::{
    Executors, MembershipChangeExecutor, PartitionChangeExecutor,
};
use topology_coordination::planner::RequestPlanner;
use topology_coordination::service::ManagementService;
use topology_coordination::store::{InMemoryTopologyStore, TopologyStore};
use topology_coordination::topology::{
    ClusterTopology, MemberId, MemberState, PartitionId, PartitionState,
};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub async fn wait_for_condition<F, Fut>(timeout: Duration, interval: Duration, f: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if f().await {
            return;
        }
        tokio::time::sleep(interval).await;
    }
    panic!("condition not met within {timeout:?}");
}

// ── Topology builders ───────────────────────────────────────────

pub fn ids(ids: &[&str]) -> BTreeSet<MemberId> {
    ids.iter().map(|id| MemberId::from(*id)).collect()
}

pub fn numbered(count: usize) -> BTreeSet<MemberId> {
    (0..count).map(|i| MemberId::from(i.to_string())).collect()
}

/// An active member holding `partitions` as `(partition, priority)`.
pub fn owning(partitions: &[(PartitionId, u32)]) -> MemberState {
    MemberState::active(
        partitions
            .iter()
            .map(|(p, priority)| (*p, PartitionState::active(*priority)))
            .collect(),
    )
}

/// Partition placement of members that have not left.
pub fn placement(topology: &ClusterTopology) -> BTreeMap<MemberId, BTreeMap<PartitionId, u32>> {
    topology
        .members
        .iter()
        .filter(|(_, m)| !m.has_left())
        .map(|(id, m)| {
            (
                id.clone(),
                m.partitions.iter().map(|(p, s)| (*p, s.priority)).collect(),
            )
        })
        .collect()
}

// ── Component builders ──────────────────────────────────────────

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        apply_retry_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

pub async fn start_coordinator(
    store: Arc<InMemoryTopologyStore>,
    executors: Executors,
) -> ChangeCoordinator {
    ChangeCoordinator::start(store, executors, test_config(), CancellationToken::new())
        .await
        .expect("coordinator should start")
}

pub async fn start_service(
    store: Arc<InMemoryTopologyStore>,
    executors: Executors,
) -> (Arc<ManagementService>, ChangeCoordinator) {
    let coordinator = start_coordinator(store, executors).await;
    let service = Arc::new(ManagementService::new(RequestPlanner::default()));
    service.install(coordinator.clone()).await;
    (service, coordinator)
}

pub async fn persisted(store: &InMemoryTopologyStore) -> Option<ClusterTopology> {
    store.load().await.expect("in-memory store never fails")
}

/// Delegates to an in-memory store; each persist waits for a released permit.
pub struct GatedStore {
    pub inner: InMemoryTopologyStore,
    gate: Semaphore,
    pub waiting: AtomicUsize,
}

impl GatedStore {
    pub fn new(topology: ClusterTopology) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryTopologyStore::with_topology(topology),
            gate: Semaphore::new(0),
            waiting: AtomicUsize::new(0),
        })
    }

    pub fn release(&self, persists: usize) {
        self.gate.add_permits(persists);
    }
}

#[async_trait]
impl TopologyStore for GatedStore {
    async fn load(&self) -> Result<Option<ClusterTopology>> {
        self.inner.load().await
    }

    async fn persist(&self, topology: &ClusterTopology) -> Result<()> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::execution(e.to_string()))?;
        permit.forget();
        self.inner.persist(topology).await
    }
}

// ── Executors ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorEvent {
    AddMember(MemberId),
    RemoveMember(MemberId),
    Join {
        member: MemberId,
        partition: PartitionId,
        priority: u32,
    },
    Leave {
        member: MemberId,
        partition: PartitionId,
    },
    Reprioritize {
        member: MemberId,
        partition: PartitionId,
        priority: u32,
    },
}

impl ExecutorEvent {
    pub fn join(member: &str, partition: PartitionId, priority: u32) -> Self {
        Self::Join {
            member: member.into(),
            partition,
            priority,
        }
    }

    pub fn leave(member: &str, partition: PartitionId) -> Self {
        Self::Leave {
            member: member.into(),
            partition,
        }
    }
}

/// Records every executor call in order.
#[derive(Default)]
pub struct RecordingExecutor {
    pub events: Mutex<Vec<ExecutorEvent>>,
}

impl RecordingExecutor {
    pub fn executors(self: &Arc<Self>) -> Executors {
        Executors::new(self.clone(), self.clone())
    }

    pub async fn events(&self) -> Vec<ExecutorEvent> {
        self.events.lock().await.clone()
    }

    async fn record(&self, event: ExecutorEvent) {
        self.events.lock().await.push(event);
    }
}

#[async_trait]
impl PartitionChangeExecutor for RecordingExecutor {
    async fn join(
        &self,
        member: &MemberId,
        partition: PartitionId,
        priority: u32,
        _replicas: &BTreeMap<MemberId, u32>,
    ) -> Result<()> {
        self.record(ExecutorEvent::Join {
            member: member.clone(),
            partition,
            priority,
        })
        .await;
        Ok(())
    }

    async fn leave(&self, member: &MemberId, partition: PartitionId) -> Result<()> {
        self.record(ExecutorEvent::Leave {
            member: member.clone(),
            partition,
        })
        .await;
        Ok(())
    }

    async fn reconfigure_priority(
        &self,
        member: &MemberId,
        partition: PartitionId,
        priority: u32,
    ) -> Result<()> {
        self.record(ExecutorEvent::Reprioritize {
            member: member.clone(),
            partition,
            priority,
        })
        .await;
        Ok(())
    }

    async fn bootstrap(
        &self,
        _member: &MemberId,
        _partition: PartitionId,
        _priority: u32,
    ) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl MembershipChangeExecutor for RecordingExecutor {
    async fn add_member(&self, member: &MemberId) -> Result<()> {
        self.record(ExecutorEvent::AddMember(member.clone())).await;
        Ok(())
    }

    async fn remove_member(&self, member: &MemberId) -> Result<()> {
        self.record(ExecutorEvent::RemoveMember(member.clone())).await;
        Ok(())
    }
}

/// Partition joins fail until `failures` attempts have been made.
pub struct FlakyPartitionExecutor {
    failures: usize,
    pub attempts: AtomicUsize,
}

impl FlakyPartitionExecutor {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PartitionChangeExecutor for FlakyPartitionExecutor {
    async fn join(
        &self,
        member: &MemberId,
        partition: PartitionId,
        _priority: u32,
        _replicas: &BTreeMap<MemberId, u32>,
    ) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(Error::execution(format!(
                "injected failure joining partition {partition} on member {member}"
            )));
        }
        Ok(())
    }

    async fn leave(&self, _member: &MemberId, _partition: PartitionId) -> Result<()> {
        Ok(())
    }

    async fn reconfigure_priority(
        &self,
        _member: &MemberId,
        _partition: PartitionId,
        _priority: u32,
    ) -> Result<()> {
        Ok(())
    }

    async fn bootstrap(
        &self,
        _member: &MemberId,
        _partition: PartitionId,
        _priority: u32,
    ) -> Result<()> {
        Ok(())
    }
}

/// Partition joins block until released.
pub struct GatedPartitionExecutor {
    gate: Semaphore,
    pub entered: AtomicUsize,
}

impl GatedPartitionExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
        })
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn release(&self, joins: usize) {
        self.gate.add_permits(joins);
    }

    pub async fn wait_until_blocked(&self) {
        wait_for_condition(WAIT_TIMEOUT, POLL_INTERVAL, || async move { self.entered() > 0 }).await;
    }
}

#[async_trait]
impl PartitionChangeExecutor for GatedPartitionExecutor {
    async fn join(
        &self,
        _member: &MemberId,
        _partition: PartitionId,
        _priority: u32,
        _replicas: &BTreeMap<MemberId, u32>,
    ) -> Result<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::execution(e.to_string()))?;
        permit.forget();
        Ok(())
    }

    async fn leave(&self, _member: &MemberId, _partition: PartitionId) -> Result<()> {
        Ok(())
    }

    async fn reconfigure_priority(
        &self,
        _member: &MemberId,
        _partition: PartitionId,
        _priority: u32,
    ) -> Result<()> {
        Ok(())
    }

    async fn bootstrap(
        &self,
        _member: &MemberId,
        _partition: PartitionId,
        _priority: u32,
    ) -> Result<()> {
        Ok(())
    }
}

pub fn with_partitions(executor: Arc<dyn PartitionChangeExecutor>) -> Executors {
    Executors::new(executor, Executors::noop().membership)
}
