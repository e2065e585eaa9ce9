use std::collections::{BTreeMap, BTreeSet};

use super::{PartitionDistribution, PartitionDistributor, ReplicaAssignment};
use crate::topology::{MemberId, PartitionId};

/// Places replicas round-robin over the sorted member ring.
///
/// Replica slots form one flat sequence (`partition_index * rf + replica`)
/// laid over the ring, so each partition gets `rf` consecutive members and
/// every member holds within one replica of every other member. Inside a
/// partition's window the walk starts one step further for each completed lap
/// around the ring, which rotates the preferred leader even when `rf` divides
/// the member count. The first member of the walk gets priority `rf`, the
/// next `rf - 1`, and so on.
///
/// `replication_factor` is clamped to the number of members.
pub struct RoundRobinDistributor;

impl PartitionDistributor for RoundRobinDistributor {
    fn distribute_partitions(
        &self,
        members: &BTreeSet<MemberId>,
        partitions: &BTreeSet<PartitionId>,
        replication_factor: usize,
    ) -> PartitionDistribution {
        if members.is_empty() || partitions.is_empty() || replication_factor == 0 {
            return PartitionDistribution::default();
        }

        let ring: Vec<&MemberId> = members.iter().collect();
        let ring_size = ring.len();
        let rf = replication_factor.min(ring_size);

        let mut distribution = BTreeMap::new();
        for (index, partition) in partitions.iter().enumerate() {
            let first_slot = index * rf;
            let lap = first_slot / ring_size;
            let replicas = (0..rf)
                .map(|replica| {
                    let slot = first_slot + (lap + replica) % rf;
                    ReplicaAssignment {
                        member: ring[slot % ring_size].clone(),
                        priority: (rf - replica) as u32,
                    }
                })
                .collect();
            distribution.insert(*partition, replicas);
        }

        PartitionDistribution::new(distribution)
    }
}
