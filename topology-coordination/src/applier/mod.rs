//! Appliers validate and execute a single [`TopologyChangeOperation`].
//!
//! An applier is used in two steps. `init` checks preconditions against the
//! current topology without side effects and returns the transition that
//! marks the operation as started. `apply` performs the effect through an
//! executor and returns the transition that completes it. `init` accepts an
//! operation already in its started state, so a retried operation validates
//! again.

mod member_join;
mod member_leave;
mod partition_join;
mod partition_leave;
mod partition_priority;

pub use member_join::MemberJoinApplier;
pub use member_leave::MemberLeaveApplier;
pub use partition_join::PartitionJoinApplier;
pub use partition_leave::PartitionLeaveApplier;
pub use partition_priority::PartitionReconfigurePriorityApplier;

use async_trait::async_trait;

use crate::error::Result;
use crate::executor::Executors;
use crate::topology::{ClusterTopology, MemberState, MemberTransition, TopologyChangeOperation};

#[async_trait]
pub trait OperationApplier: Send + Sync {
    /// Validate against `topology` and return the "in progress" transition.
    fn init(&mut self, topology: &ClusterTopology) -> Result<MemberTransition>;

    /// Execute the operation and return the transition that completes it.
    async fn apply(&self) -> Result<MemberTransition>;

    /// The transition `apply` returns on success, without running the executor.
    fn completion(&self) -> MemberTransition;
}

#[derive(Debug, Clone)]
pub struct ApplierConfig {
    /// Active replicas that must remain when a member leaves a partition.
    pub minimum_replicas: usize,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            minimum_replicas: 1,
        }
    }
}

pub fn get_applier(
    operation: &TopologyChangeOperation,
    executors: &Executors,
    config: &ApplierConfig,
) -> Box<dyn OperationApplier> {
    match operation {
        TopologyChangeOperation::MemberJoin { member } => Box::new(MemberJoinApplier::new(
            member.clone(),
            executors.membership.clone(),
        )),
        TopologyChangeOperation::MemberLeave { member } => Box::new(MemberLeaveApplier::new(
            member.clone(),
            executors.membership.clone(),
        )),
        TopologyChangeOperation::PartitionJoin {
            member,
            partition,
            priority,
        } => Box::new(PartitionJoinApplier::new(
            member.clone(),
            *partition,
            *priority,
            executors.partitions.clone(),
        )),
        TopologyChangeOperation::PartitionLeave { member, partition } => {
            Box::new(PartitionLeaveApplier::new(
                member.clone(),
                *partition,
                config.minimum_replicas,
                executors.partitions.clone(),
            ))
        }
        TopologyChangeOperation::PartitionReconfigurePriority {
            member,
            partition,
            priority,
        } => Box::new(PartitionReconfigurePriorityApplier::new(
            member.clone(),
            *partition,
            *priority,
            executors.partitions.clone(),
        )),
    }
}

/// Runs `operations` in plan order against `topology` without executing
/// anything: each operation is validated against the result of all earlier
/// ones. Returns the topology the plan is expected to produce, or the first
/// validation error.
pub fn simulate_operations(
    topology: &ClusterTopology,
    operations: &[TopologyChangeOperation],
    executors: &Executors,
    config: &ApplierConfig,
) -> Result<ClusterTopology> {
    let mut simulated = topology.clone();
    for operation in operations {
        let member = operation.member();
        let mut applier = get_applier(operation, executors, config);
        let started = applier.init(&simulated)?;
        simulated = simulated.update_member(member, &started);
        simulated = simulated.update_member(member, &applier.completion());
    }
    Ok(simulated)
}

fn member_or_new(member: Option<&MemberState>) -> MemberState {
    member.cloned().unwrap_or_else(MemberState::joining)
}
