use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::topology::{MemberId, PartitionId};

/// Moves partition data on the member executing an operation.
///
/// Implementations perform the real I/O: joining the partition's replication
/// group, leaving it, or bootstrapping a brand new partition. One executor
/// serves every member, so each call names the member it acts for.
#[async_trait]
pub trait PartitionChangeExecutor: Send + Sync {
    /// `member` joins `partition` with `priority`. `replicas` holds every
    /// member of the partition after the join, including `member`.
    async fn join(
        &self,
        member: &MemberId,
        partition: PartitionId,
        priority: u32,
        replicas: &BTreeMap<MemberId, u32>,
    ) -> Result<()>;

    async fn leave(&self, member: &MemberId, partition: PartitionId) -> Result<()>;

    /// Change `member`'s leader priority for `partition`.
    async fn reconfigure_priority(
        &self,
        member: &MemberId,
        partition: PartitionId,
        priority: u32,
    ) -> Result<()>;

    /// Create the first replica of a partition on `member`.
    async fn bootstrap(&self, member: &MemberId, partition: PartitionId, priority: u32)
        -> Result<()>;
}

/// Adds and removes members from cluster membership.
#[async_trait]
pub trait MembershipChangeExecutor: Send + Sync {
    async fn add_member(&self, member: &MemberId) -> Result<()>;

    async fn remove_member(&self, member: &MemberId) -> Result<()>;
}

/// Executors the appliers delegate to.
#[derive(Clone)]
pub struct Executors {
    pub partitions: Arc<dyn PartitionChangeExecutor>,
    pub membership: Arc<dyn MembershipChangeExecutor>,
}

impl Executors {
    pub fn new(
        partitions: Arc<dyn PartitionChangeExecutor>,
        membership: Arc<dyn MembershipChangeExecutor>,
    ) -> Self {
        Self {
            partitions,
            membership,
        }
    }

    /// Executors that succeed immediately without doing any I/O.
    pub fn noop() -> Self {
        Self::new(
            Arc::new(NoopPartitionChangeExecutor),
            Arc::new(NoopMembershipChangeExecutor),
        )
    }
}

pub struct NoopPartitionChangeExecutor;

#[async_trait]
impl PartitionChangeExecutor for NoopPartitionChangeExecutor {
    async fn join(
        &self,
        member: &MemberId,
        partition: PartitionId,
        priority: u32,
        replicas: &BTreeMap<MemberId, u32>,
    ) -> Result<()> {
        tracing::debug!(
            member = %member,
            partition,
            priority,
            replicas = replicas.len(),
            "noop partition join"
        );
        Ok(())
    }

    async fn leave(&self, member: &MemberId, partition: PartitionId) -> Result<()> {
        tracing::debug!(member = %member, partition, "noop partition leave");
        Ok(())
    }

    async fn reconfigure_priority(
        &self,
        member: &MemberId,
        partition: PartitionId,
        priority: u32,
    ) -> Result<()> {
        tracing::debug!(member = %member, partition, priority, "noop partition priority change");
        Ok(())
    }

    async fn bootstrap(
        &self,
        member: &MemberId,
        partition: PartitionId,
        priority: u32,
    ) -> Result<()> {
        tracing::debug!(member = %member, partition, priority, "noop partition bootstrap");
        Ok(())
    }
}

pub struct NoopMembershipChangeExecutor;

#[async_trait]
impl MembershipChangeExecutor for NoopMembershipChangeExecutor {
    async fn add_member(&self, member: &MemberId) -> Result<()> {
        tracing::debug!(member = %member, "noop member add");
        Ok(())
    }

    async fn remove_member(&self, member: &MemberId) -> Result<()> {
        tracing::debug!(member = %member, "noop member remove");
        Ok(())
    }
}
