use std::fmt;

use serde::{Deserialize, Serialize};

use super::member::{MemberId, PartitionId};

/// One atomic step of a topology change. Each operation is executed by the
/// member it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TopologyChangeOperation {
    MemberJoin {
        member: MemberId,
    },
    MemberLeave {
        member: MemberId,
    },
    PartitionJoin {
        member: MemberId,
        partition: PartitionId,
        priority: u32,
    },
    PartitionLeave {
        member: MemberId,
        partition: PartitionId,
    },
    /// Changes the leader priority of a replica the member already holds.
    PartitionReconfigurePriority {
        member: MemberId,
        partition: PartitionId,
        priority: u32,
    },
}

impl TopologyChangeOperation {
    pub fn member_join(member: impl Into<MemberId>) -> Self {
        Self::MemberJoin {
            member: member.into(),
        }
    }

    pub fn member_leave(member: impl Into<MemberId>) -> Self {
        Self::MemberLeave {
            member: member.into(),
        }
    }

    pub fn partition_join(member: impl Into<MemberId>, partition: PartitionId, priority: u32) -> Self {
        Self::PartitionJoin {
            member: member.into(),
            partition,
            priority,
        }
    }

    pub fn partition_leave(member: impl Into<MemberId>, partition: PartitionId) -> Self {
        Self::PartitionLeave {
            member: member.into(),
            partition,
        }
    }

    pub fn partition_reconfigure_priority(
        member: impl Into<MemberId>,
        partition: PartitionId,
        priority: u32,
    ) -> Self {
        Self::PartitionReconfigurePriority {
            member: member.into(),
            partition,
            priority,
        }
    }

    pub fn member(&self) -> &MemberId {
        match self {
            Self::MemberJoin { member }
            | Self::MemberLeave { member }
            | Self::PartitionJoin { member, .. }
            | Self::PartitionLeave { member, .. }
            | Self::PartitionReconfigurePriority { member, .. } => member,
        }
    }

    pub fn partition(&self) -> Option<PartitionId> {
        match self {
            Self::PartitionJoin { partition, .. }
            | Self::PartitionLeave { partition, .. }
            | Self::PartitionReconfigurePriority { partition, .. } => Some(*partition),
            Self::MemberJoin { .. } | Self::MemberLeave { .. } => None,
        }
    }
}

impl fmt::Display for TopologyChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemberJoin { member } => write!(f, "MemberJoin({member})"),
            Self::MemberLeave { member } => write!(f, "MemberLeave({member})"),
            Self::PartitionJoin {
                member,
                partition,
                priority,
            } => write!(f, "PartitionJoin({member}, {partition}, {priority})"),
            Self::PartitionLeave { member, partition } => {
                write!(f, "PartitionLeave({member}, {partition})")
            }
            Self::PartitionReconfigurePriority {
                member,
                partition,
                priority,
            } => write!(f, "PartitionReconfigurePriority({member}, {partition}, {priority})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_serialize_with_type_tag() {
        let op = TopologyChangeOperation::partition_join("2", 4, 1);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "PartitionJoin", "member": "2", "partition": 4, "priority": 1})
        );
    }

    #[test]
    fn display_names_member_and_partition() {
        assert_eq!(
            TopologyChangeOperation::partition_leave("1", 2).to_string(),
            "PartitionLeave(1, 2)"
        );
        assert_eq!(TopologyChangeOperation::member_join("3").to_string(), "MemberJoin(3)");
    }
}
