use std::sync::Arc;

use async_trait::async_trait;

use super::{member_or_new, OperationApplier};
use crate::error::{Error, Result};
use crate::executor::PartitionChangeExecutor;
use crate::topology::{
    ClusterTopology, MemberId, MemberState, MemberTransition, PartitionId, PartitionStatus,
};

/// Removes a member's replica of a partition.
///
/// Refused when fewer than `minimum_replicas` active replicas would remain on
/// other members, so a partition is never left without an owner.
pub struct PartitionLeaveApplier {
    member: MemberId,
    partition: PartitionId,
    minimum_replicas: usize,
    executor: Arc<dyn PartitionChangeExecutor>,
}

impl PartitionLeaveApplier {
    pub fn new(
        member: MemberId,
        partition: PartitionId,
        minimum_replicas: usize,
        executor: Arc<dyn PartitionChangeExecutor>,
    ) -> Self {
        Self {
            member,
            partition,
            minimum_replicas,
            executor,
        }
    }

    fn reject(&self, reason: &str) -> Error {
        Error::validation(format!(
            "Expected to leave partition {} on member {}, but {reason}",
            self.partition, self.member
        ))
    }
}

#[async_trait]
impl OperationApplier for PartitionLeaveApplier {
    fn init(&mut self, topology: &ClusterTopology) -> Result<MemberTransition> {
        let member = topology
            .member(&self.member)
            .ok_or_else(|| self.reject("the member is not part of the cluster"))?;
        let replica = member
            .get_partition(self.partition)
            .ok_or_else(|| self.reject("the member does not hold the partition"))?;
        if replica.state == PartitionStatus::Joining {
            return Err(self.reject("the partition is still joining on the member"));
        }

        let remaining = topology
            .partition_replicas(self.partition)
            .iter()
            .filter(|(id, p)| **id != self.member && p.state == PartitionStatus::Active)
            .count();
        if remaining < self.minimum_replicas {
            return Err(self.reject(&format!(
                "only {remaining} other active replicas would remain, at least {} are required",
                self.minimum_replicas
            )));
        }

        let partition = self.partition;
        Ok(Box::new(move |member: Option<&MemberState>| {
            member_or_new(member).update_partition(partition, |p| p.to_leaving())
        }))
    }

    async fn apply(&self) -> Result<MemberTransition> {
        self.executor.leave(&self.member, self.partition).await?;
        Ok(self.completion())
    }

    fn completion(&self) -> MemberTransition {
        let partition = self.partition;
        Box::new(move |member: Option<&MemberState>| {
            member_or_new(member).without_partition(partition)
        })
    }
}
