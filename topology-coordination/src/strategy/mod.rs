mod round_robin;

pub use round_robin::RoundRobinDistributor;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::topology::{MemberId, PartitionId};

/// Trait for partition distribution strategies.
///
/// The planner calls `distribute_partitions` to compute the desired placement
/// for a set of members and diffs the result against the live topology to
/// derive partition joins and leaves. Implementations must be pure: the same
/// inputs always produce the same distribution, regardless of the order in
/// which members were collected.
pub trait PartitionDistributor: Send + Sync {
    /// Compute the desired placement.
    ///
    /// - `members`: members eligible to hold replicas
    /// - `partitions`: every partition that must be placed
    /// - `replication_factor`: replicas per partition
    fn distribute_partitions(
        &self,
        members: &BTreeSet<MemberId>,
        partitions: &BTreeSet<PartitionId>,
        replication_factor: usize,
    ) -> PartitionDistribution;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaAssignment {
    pub member: MemberId,
    pub priority: u32,
}

/// Desired replicas of every partition, highest priority first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDistribution {
    partitions: BTreeMap<PartitionId, Vec<ReplicaAssignment>>,
}

impl PartitionDistribution {
    pub fn new(partitions: BTreeMap<PartitionId, Vec<ReplicaAssignment>>) -> Self {
        Self { partitions }
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn partitions(&self) -> impl Iterator<Item = (PartitionId, &[ReplicaAssignment])> {
        self.partitions.iter().map(|(p, r)| (*p, r.as_slice()))
    }

    pub fn replicas(&self, partition: PartitionId) -> &[ReplicaAssignment] {
        self.partitions
            .get(&partition)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Member with the highest priority for `partition`.
    pub fn primary(&self, partition: PartitionId) -> Option<&MemberId> {
        self.replicas(partition).first().map(|r| &r.member)
    }

    /// Partitions and priorities per member.
    pub fn by_member(&self) -> BTreeMap<MemberId, BTreeMap<PartitionId, u32>> {
        let mut members: BTreeMap<MemberId, BTreeMap<PartitionId, u32>> = BTreeMap::new();
        for (partition, replicas) in &self.partitions {
            for replica in replicas {
                members
                    .entry(replica.member.clone())
                    .or_default()
                    .insert(*partition, replica.priority);
            }
        }
        members
    }
}
