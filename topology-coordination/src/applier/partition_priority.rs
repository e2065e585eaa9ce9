use std::sync::Arc;

use async_trait::async_trait;

use super::{member_or_new, OperationApplier};
use crate::error::{Error, Result};
use crate::executor::PartitionChangeExecutor;
use crate::topology::{
    ClusterTopology, MemberId, MemberState, MemberTransition, PartitionId, PartitionStatus,
};

/// Changes the leader priority of an active replica. The replica stays
/// `Active` throughout.
pub struct PartitionReconfigurePriorityApplier {
    member: MemberId,
    partition: PartitionId,
    priority: u32,
    executor: Arc<dyn PartitionChangeExecutor>,
}

impl PartitionReconfigurePriorityApplier {
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
        }
    }
}

#[async_trait]
impl OperationApplier for PartitionReconfigurePriorityApplier {
    fn init(&mut self, topology: &ClusterTopology) -> Result<MemberTransition> {
        let replica = topology
            .member(&self.member)
            .and_then(|m| m.get_partition(self.partition));
        match replica {
            Some(p) if p.state == PartitionStatus::Active => {
                Ok(Box::new(|member: Option<&MemberState>| member_or_new(member)))
            }
            _ => Err(Error::validation(format!(
                "Expected to change priority of partition {} on member {}, but the member does not hold an active replica",
                self.partition, self.member
            ))),
        }
    }

    async fn apply(&self) -> Result<MemberTransition> {
        self.executor
            .reconfigure_priority(&self.member, self.partition, self.priority)
            .await?;
        Ok(self.completion())
    }

    fn completion(&self) -> MemberTransition {
        let (partition, priority) = (self.partition, self.priority);
        Box::new(move |member: Option<&MemberState>| {
            member_or_new(member).update_partition(partition, |p| p.with_priority(priority))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::executor::NoopPartitionChangeExecutor;
    use crate::topology::PartitionState;

    fn applier(member: &str, priority: u32) -> PartitionReconfigurePriorityApplier {
        PartitionReconfigurePriorityApplier::new(
            member.into(),
            1,
            priority,
            Arc::new(NoopPartitionChangeExecutor),
        )
    }

    #[tokio::test]
    async fn priority_is_updated_on_completion() {
        let topology = ClusterTopology::init().add_member(
            "1",
            MemberState::active(BTreeMap::from([(1, PartitionState::active(1))])),
        );
        let mut applier = applier("1", 3);
        let started = applier.init(&topology).unwrap();
        let unchanged = started(topology.member(&"1".into()));
        assert_eq!(unchanged.get_partition(1), Some(&PartitionState::active(1)));

        let completed = applier.apply().await.unwrap();
        assert_eq!(
            completed(Some(&unchanged)).get_partition(1),
            Some(&PartitionState::active(3))
        );
    }

    #[test]
    fn missing_replica_is_rejected() {
        let topology =
            ClusterTopology::init().add_member("1", MemberState::active(BTreeMap::new()));
        assert!(applier("1", 2).init(&topology).is_err());
    }
}
