use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::member::MemberId;
use super::operation::TopologyChangeOperation;

/// Final state of a change that is no longer in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedOperation {
    pub operation: TopologyChangeOperation,
    pub completed_at: i64,
}

/// The in-flight change: the plan's operations, split into completed and pending.
///
/// Pending operations keep the plan order. A member only ever works on its
/// first pending operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    /// Topology version at which the change started.
    pub id: u64,
    pub started_at: i64,
    pub completed: Vec<CompletedOperation>,
    pub pending: Vec<TopologyChangeOperation>,
}

/// Summary of the most recent change that left the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedChange {
    pub id: u64,
    pub outcome: ChangeOutcome,
    pub started_at: i64,
    pub completed_at: i64,
}

impl ChangeStatus {
    pub fn new(id: u64, operations: Vec<TopologyChangeOperation>, started_at: i64) -> Self {
        Self {
            id,
            started_at,
            completed: Vec::new(),
            pending: operations,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn next_pending_index(&self, member: &MemberId) -> Option<usize> {
        self.pending.iter().position(|op| op.member() == member)
    }

    /// The operation `member` must execute next, if any.
    pub fn next_pending_operation(&self, member: &MemberId) -> Option<&TopologyChangeOperation> {
        self.next_pending_index(member).map(|i| &self.pending[i])
    }

    /// Whether `member` may start its next operation now.
    ///
    /// An operation waits while an earlier pending operation of another member
    /// touches the same partition, so a replica joins before another leaves.
    pub fn is_runnable(&self, member: &MemberId) -> bool {
        let Some(index) = self.next_pending_index(member) else {
            return false;
        };
        let Some(partition) = self.pending[index].partition() else {
            return true;
        };
        !self.pending[..index]
            .iter()
            .any(|op| op.member() != member && op.partition() == Some(partition))
    }

    /// Members that still have pending operations, in id order.
    pub fn members_with_pending(&self) -> BTreeSet<MemberId> {
        self.pending.iter().map(|op| op.member().clone()).collect()
    }

    /// Moves `member`'s next pending operation to the completed list.
    pub fn advance(&self, member: &MemberId, completed_at: i64) -> Option<Self> {
        let index = self.next_pending_index(member)?;
        let mut pending = self.pending.clone();
        let operation = pending.remove(index);
        let mut completed = self.completed.clone();
        completed.push(CompletedOperation {
            operation,
            completed_at,
        });
        Some(Self {
            id: self.id,
            started_at: self.started_at,
            completed,
            pending,
        })
    }

    pub fn finish(&self, outcome: ChangeOutcome, completed_at: i64) -> CompletedChange {
        CompletedChange {
            id: self.id,
            outcome,
            started_at: self.started_at,
            completed_at,
        }
    }
}
