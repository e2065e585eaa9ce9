use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{member_or_new, OperationApplier};
use crate::error::{Error, Result};
use crate::executor::PartitionChangeExecutor;
use crate::topology::{
    ClusterTopology, MemberId, MemberState, MemberTransition, PartitionId, PartitionState,
    PartitionStatus,
};

/// Adds a replica of an existing partition to a member.
///
/// The partition must already be active on some other member; creating
/// partitions from nothing is not a topology change.
pub struct PartitionJoinApplier {
    member: MemberId,
    partition: PartitionId,
    priority: u32,
    executor: Arc<dyn PartitionChangeExecutor>,
    /// Replica priorities after the join, captured by `init`.
    replicas: BTreeMap<MemberId, u32>,
}

impl PartitionJoinApplier {
    pub fn new(
        member: MemberId,
        partition: PartitionId,
        priority: u32,
        executor: Arc<dyn PartitionChangeExecutor>,
    ) -> Self {
        Self {
            member,
            partition,
            priority,
            executor,
            replicas: BTreeMap::new(),
        }
    }

    fn reject(&self, reason: &str) -> Error {
        Error::validation(format!(
            "Expected to join partition {} on member {}, but {reason}",
            self.partition, self.member
        ))
    }
}

#[async_trait]
impl OperationApplier for PartitionJoinApplier {
    fn init(&mut self, topology: &ClusterTopology) -> Result<MemberTransition> {
        let current = topology.partition_replicas(self.partition);
        let has_active_replica = current
            .iter()
            .any(|(id, p)| *id != self.member && p.state == PartitionStatus::Active);
        if !has_active_replica {
            return Err(self.reject("partition has no active members"));
        }

        let member = topology
            .member(&self.member)
            .ok_or_else(|| self.reject("the member is not part of the cluster"))?;
        if !member.is_active() {
            return Err(self.reject(&format!("the member is in state {:?}", member.state)));
        }
        if let Some(existing) = member.get_partition(self.partition) {
            if existing.state != PartitionStatus::Joining {
                return Err(self.reject("the member already holds the partition"));
            }
        }

        self.replicas = current
            .iter()
            .filter(|(_, p)| p.state != PartitionStatus::Leaving)
            .map(|(id, p)| (id.clone(), p.priority))
            .collect();
        self.replicas.insert(self.member.clone(), self.priority);

        let (partition, priority) = (self.partition, self.priority);
        Ok(Box::new(move |member: Option<&MemberState>| {
            member_or_new(member).with_partition(partition, PartitionState::joining(priority))
        }))
    }

    async fn apply(&self) -> Result<MemberTransition> {
        self.executor
            .join(&self.member, self.partition, self.priority, &self.replicas)
            .await?;
        Ok(self.completion())
    }

    fn completion(&self) -> MemberTransition {
        let (partition, priority) = (self.partition, self.priority);
        Box::new(move |member: Option<&MemberState>| {
            member_or_new(member).with_partition(partition, PartitionState::active(priority))
        })
    }
}
