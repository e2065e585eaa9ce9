//! Turns management requests into ordered operation lists.
//!
//! Planning is pure: it reads a topology snapshot and never mutates anything.
//! Preconditions that depend on the state an operation finds when it runs are
//! left to the appliers; the planner only rejects requests that cannot be
//! expressed at all.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::api::ClusterPatchRequest;
use crate::error::{Error, Result};
use crate::strategy::{PartitionDistributor, RoundRobinDistributor};
use crate::topology::{
    ClusterTopology, MemberId, MemberState, PartitionId, PartitionState, TopologyChangeOperation,
};
use crate::util;

pub struct RequestPlanner {
    distributor: Arc<dyn PartitionDistributor>,
}

impl Default for RequestPlanner {
    fn default() -> Self {
        Self::new(Arc::new(RoundRobinDistributor))
    }
}

impl RequestPlanner {
    pub fn new(distributor: Arc<dyn PartitionDistributor>) -> Self {
        Self { distributor }
    }

    /// A topology where `members` already hold partitions `1..=partition_count`
    /// as the distributor places them. Used to seed an empty store.
    pub fn initial_topology(
        &self,
        members: &BTreeSet<MemberId>,
        partition_count: u32,
        replication_factor: usize,
    ) -> Result<ClusterTopology> {
        validate_members(members.iter())?;
        if members.is_empty() {
            return Err(Error::validation("an initial topology needs at least one member"));
        }
        if replication_factor == 0 || replication_factor > members.len() {
            return Err(Error::validation(format!(
                "replication factor {replication_factor} must be between 1 and the member count {}",
                members.len()
            )));
        }

        let partitions: BTreeSet<PartitionId> = (1..=partition_count).collect();
        let by_member = self
            .distributor
            .distribute_partitions(members, &partitions, replication_factor)
            .by_member();

        let topology = members.iter().fold(ClusterTopology::init(), |topology, member| {
            let owned = by_member
                .get(member)
                .map(|owned| {
                    owned
                        .iter()
                        .map(|(p, priority)| (*p, PartitionState::active(*priority)))
                        .collect()
                })
                .unwrap_or_default();
            topology.add_member(member.clone(), MemberState::active(owned))
        });
        Ok(topology)
    }

    /// One `MemberJoin` per member that is not part of the cluster, in id order.
    pub fn add_members(
        &self,
        topology: &ClusterTopology,
        members: &BTreeSet<MemberId>,
    ) -> Result<Vec<TopologyChangeOperation>> {
        validate_members(members.iter())?;
        Ok(members
            .iter()
            .filter(|m| !topology.has_member(m))
            .map(|m| TopologyChangeOperation::member_join(m.clone()))
            .collect())
    }

    /// One `MemberLeave` per member, in request order.
    pub fn remove_members(
        &self,
        topology: &ClusterTopology,
        members: &[MemberId],
    ) -> Result<Vec<TopologyChangeOperation>> {
        let mut seen = BTreeSet::new();
        let mut operations = Vec::new();
        for member in members {
            if !topology.has_member(member) {
                return Err(Error::validation(format!(
                    "Expected to remove member {member}, but the member is not part of the cluster"
                )));
            }
            if seen.insert(member) {
                operations.push(TopologyChangeOperation::member_leave(member.clone()));
            }
        }
        Ok(operations)
    }

    pub fn join_partition(
        &self,
        member: &MemberId,
        partition: PartitionId,
        priority: u32,
    ) -> Result<Vec<TopologyChangeOperation>> {
        util::validate_identifier(member.as_str())?;
        if priority == 0 {
            return Err(Error::validation(format!(
                "Expected to join partition {partition} on member {member}, but priority must be at least 1"
            )));
        }
        Ok(vec![TopologyChangeOperation::partition_join(
            member.clone(),
            partition,
            priority,
        )])
    }

    pub fn leave_partition(
        &self,
        member: &MemberId,
        partition: PartitionId,
    ) -> Result<Vec<TopologyChangeOperation>> {
        util::validate_identifier(member.as_str())?;
        Ok(vec![TopologyChangeOperation::partition_leave(
            member.clone(),
            partition,
        )])
    }

    /// Redistributes every partition over `members` at the current
    /// replication factor. All of `members` must already be in the cluster.
    pub fn reassign_partitions(
        &self,
        topology: &ClusterTopology,
        members: &BTreeSet<MemberId>,
    ) -> Result<Vec<TopologyChangeOperation>> {
        if members.is_empty() {
            return Err(Error::validation(
                "Expected to reassign partitions, but no members were given",
            ));
        }
        if let Some(unknown) = members.iter().find(|m| !topology.has_member(m)) {
            return Err(Error::validation(format!(
                "Expected to reassign partitions to member {unknown}, but the member is not part of the cluster"
            )));
        }

        let replication_factor = topology.replication_factor();
        if replication_factor > members.len() {
            return Err(Error::validation(format!(
                "Expected to reassign partitions to {} members, but the replication factor is {replication_factor}",
                members.len()
            )));
        }

        Ok(self.partition_changes(topology, members, replication_factor))
    }

    /// Joins new members, redistributes partitions over `members` and removes
    /// members that are not in `members`.
    ///
    /// Without `force` the replication factor may not exceed the new member
    /// count. With `force` it is reduced to the new member count.
    pub fn scale_members(
        &self,
        topology: &ClusterTopology,
        members: &BTreeSet<MemberId>,
        replication_factor: Option<usize>,
        force: bool,
    ) -> Result<Vec<TopologyChangeOperation>> {
        validate_members(members.iter())?;
        if members.is_empty() {
            return Err(Error::validation(
                "Expected to scale the cluster, but no members were given",
            ));
        }
        if replication_factor == Some(0) && !topology.partition_ids().is_empty() {
            return Err(Error::validation(
                "Expected to scale the cluster, but replication factor must be at least 1",
            ));
        }

        let mut replication_factor = replication_factor.unwrap_or(topology.replication_factor());
        if replication_factor > members.len() {
            if !force {
                return Err(Error::validation(format!(
                    "Expected to scale to {} members, but replication factor {replication_factor} needs at least {replication_factor} members",
                    members.len()
                )));
            }
            tracing::info!(
                from = replication_factor,
                to = members.len(),
                "reducing replication factor to scale below it"
            );
            replication_factor = members.len();
        }

        let joins = members
            .iter()
            .filter(|m| !topology.has_member(m))
            .map(|m| TopologyChangeOperation::member_join(m.clone()));
        let leaves = topology
            .current_members()
            .into_iter()
            .filter(|m| !members.contains(m))
            .map(TopologyChangeOperation::member_leave);

        let mut operations: Vec<_> = joins.collect();
        operations.extend(self.partition_changes(topology, members, replication_factor));
        operations.extend(leaves);
        Ok(operations)
    }

    /// Applies a patch to the member set and scales to the result.
    pub fn patch_cluster(
        &self,
        topology: &ClusterTopology,
        patch: &ClusterPatchRequest,
    ) -> Result<Vec<TopologyChangeOperation>> {
        let mut members: BTreeSet<MemberId> = match patch.brokers.count {
            Some(count) => (0..count).map(|i| MemberId::from(i.to_string())).collect(),
            None => topology.current_members(),
        };
        members.extend(patch.brokers.add.iter().cloned());
        for removed in &patch.brokers.remove {
            members.remove(removed);
        }

        if let Some(count) = patch.partitions.count {
            let current = topology.partition_ids().len();
            if count != current {
                return Err(Error::validation(format!(
                    "Expected to change the partition count to {count}, but the cluster has {current} partitions and the partition count cannot be changed"
                )));
            }
        }

        self.scale_members(topology, &members, patch.partitions.replication_factor, false)
    }

    /// Diff between the current placement and the distributor's placement
    /// over `members`. Per partition: joins (highest priority first), then
    /// priority changes, then leaves.
    fn partition_changes(
        &self,
        topology: &ClusterTopology,
        members: &BTreeSet<MemberId>,
        replication_factor: usize,
    ) -> Vec<TopologyChangeOperation> {
        let distribution = self.distributor.distribute_partitions(
            members,
            &topology.partition_ids(),
            replication_factor,
        );

        let mut operations = Vec::new();
        for (partition, desired) in distribution.partitions() {
            let current = topology.partition_replicas(partition);

            for replica in desired {
                if !current.contains_key(&replica.member) {
                    operations.push(TopologyChangeOperation::partition_join(
                        replica.member.clone(),
                        partition,
                        replica.priority,
                    ));
                }
            }

            let mut reprioritized: Vec<_> = desired
                .iter()
                .filter(|r| {
                    current
                        .get(&r.member)
                        .is_some_and(|state| state.priority != r.priority)
                })
                .collect();
            reprioritized.sort_by(|a, b| a.member.cmp(&b.member));
            for replica in reprioritized {
                operations.push(TopologyChangeOperation::partition_reconfigure_priority(
                    replica.member.clone(),
                    partition,
                    replica.priority,
                ));
            }

            let kept: BTreeSet<&MemberId> = desired.iter().map(|r| &r.member).collect();
            for member in current.keys().filter(|m| !kept.contains(m)) {
                operations.push(TopologyChangeOperation::partition_leave(
                    member.clone(),
                    partition,
                ));
            }
        }
        operations
    }
}

fn validate_members<'a>(members: impl Iterator<Item = &'a MemberId>) -> Result<()> {
    for member in members {
        util::validate_identifier(member.as_str())?;
    }
    Ok(())
}
