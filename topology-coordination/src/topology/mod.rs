//! The authoritative, versioned view of cluster membership and partition
//! placement.
//!
//! [`ClusterTopology`] is a value: every update returns a new topology and
//! leaves the receiver untouched, so snapshots handed to readers never change
//! underneath them.

mod change;
mod member;
mod operation;

pub use change::{ChangeOutcome, ChangeStatus, CompletedChange, CompletedOperation};
pub use member::{MemberId, MemberState, MemberStatus, PartitionId, PartitionState, PartitionStatus};
pub use operation::TopologyChangeOperation;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Pure update of a single member. Receives `None` when the member is not yet
/// part of the topology.
pub type MemberTransition = Box<dyn Fn(Option<&MemberState>) -> MemberState + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    pub version: u64,
    pub members: BTreeMap<MemberId, MemberState>,
    pub last_change: Option<CompletedChange>,
    pub pending_change: Option<ChangeStatus>,
}

impl Default for ClusterTopology {
    fn default() -> Self {
        Self::init()
    }
}

impl ClusterTopology {
    pub fn init() -> Self {
        Self {
            version: 0,
            members: BTreeMap::new(),
            last_change: None,
            pending_change: None,
        }
    }

    /// Adds or replaces a member outside of any change. Used when seeding a
    /// topology from static configuration.
    pub fn add_member(&self, member: impl Into<MemberId>, state: MemberState) -> Self {
        let mut members = self.members.clone();
        members.insert(member.into(), state);
        Self {
            members,
            ..self.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending_change.is_some()
    }

    pub fn pending_change(&self) -> Option<&ChangeStatus> {
        self.pending_change.as_ref()
    }

    pub fn member(&self, member: &MemberId) -> Option<&MemberState> {
        self.members.get(member)
    }

    /// True for members that have not left.
    pub fn has_member(&self, member: &MemberId) -> bool {
        self.members.get(member).is_some_and(|m| !m.has_left())
    }

    /// Ids of all members that have not left.
    pub fn current_members(&self) -> BTreeSet<MemberId> {
        self.members
            .iter()
            .filter(|(_, state)| !state.has_left())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn partition_ids(&self) -> BTreeSet<PartitionId> {
        self.members
            .values()
            .flat_map(|m| m.partitions.keys().copied())
            .collect()
    }

    /// Every member holding a replica of `partition`, with its replica state.
    pub fn partition_replicas(&self, partition: PartitionId) -> BTreeMap<MemberId, PartitionState> {
        self.members
            .iter()
            .filter_map(|(id, m)| m.get_partition(partition).map(|p| (id.clone(), *p)))
            .collect()
    }

    /// Highest replica count of any partition; 0 for a topology without partitions.
    pub fn replication_factor(&self) -> usize {
        self.partition_ids()
            .into_iter()
            .map(|p| self.partition_replicas(p).len())
            .max()
            .unwrap_or(0)
    }

    /// Applies `transition` to one member. Does not change the topology version.
    pub fn update_member(&self, member: &MemberId, transition: &MemberTransition) -> Self {
        let updated = transition(self.members.get(member));
        let mut members = self.members.clone();
        members.insert(member.clone(), updated);
        Self {
            members,
            ..self.clone()
        }
    }

    /// Installs a new change. Bumps the version; the new version is the change id.
    pub fn start_topology_change(
        &self,
        operations: Vec<TopologyChangeOperation>,
        now: i64,
    ) -> Result<Self> {
        if let Some(change) = &self.pending_change {
            return Err(Error::ConcurrentChange {
                change_id: change.id,
            });
        }
        if operations.is_empty() {
            return Err(Error::validation(
                "cannot start a topology change without operations",
            ));
        }

        let version = self.version + 1;
        Ok(Self {
            version,
            members: self.members.clone(),
            last_change: self.last_change,
            pending_change: Some(ChangeStatus::new(version, operations, now)),
        })
    }

    /// Completes `member`'s next pending operation by applying `transition`.
    /// Completing the last pending operation finishes the change and bumps the
    /// version.
    pub fn advance_topology_change(
        &self,
        member: &MemberId,
        transition: &MemberTransition,
        now: i64,
    ) -> Result<Self> {
        let change = self
            .pending_change
            .as_ref()
            .ok_or_else(|| Error::invalid_state("no topology change in progress"))?;
        let advanced = change.advance(member, now).ok_or_else(|| {
            Error::invalid_state(format!(
                "member {member} has no pending operation in change {}",
                change.id
            ))
        })?;

        let updated = self.update_member(member, transition);
        if advanced.has_pending() {
            return Ok(Self {
                pending_change: Some(advanced),
                ..updated
            });
        }

        Ok(Self {
            version: self.version + 1,
            members: updated.members,
            last_change: Some(advanced.finish(ChangeOutcome::Completed, now)),
            pending_change: None,
        })
    }

    /// Drops the remaining operations of change `change_id`. Member states
    /// already reached are kept.
    pub fn cancel_topology_change(&self, change_id: u64, now: i64) -> Result<Self> {
        match &self.pending_change {
            Some(change) if change.id == change_id => Ok(Self {
                version: self.version + 1,
                members: self.members.clone(),
                last_change: Some(change.finish(ChangeOutcome::Cancelled, now)),
                pending_change: None,
            }),
            Some(change) => Err(Error::validation(format!(
                "change {change_id} is not in progress, the current change is {}",
                change.id
            ))),
            None => Err(Error::NotFound(format!("change {change_id} is not in progress"))),
        }
    }

    /// Whether the change that was started at or before `version` has finished.
    pub fn has_completed_changes(&self, version: u64) -> bool {
        match &self.pending_change {
            Some(change) => change.id > version,
            None => self.version > version,
        }
    }
}
