//! Management request and response shapes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ErrorResponse;
use crate::topology::{ClusterTopology, MemberId, PartitionId, TopologyChangeOperation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMembersRequest {
    pub members: BTreeSet<MemberId>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Members leave in the order given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMembersRequest {
    pub members: Vec<MemberId>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPartitionRequest {
    pub member: MemberId,
    pub partition: PartitionId,
    pub priority: u32,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePartitionRequest {
    pub member: MemberId,
    pub partition: PartitionId,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignPartitionsRequest {
    pub members: BTreeSet<MemberId>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub members: BTreeSet<MemberId>,
    /// Defaults to the current replication factor.
    #[serde(default)]
    pub replication_factor: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
    /// Allow scaling below the current replication factor, which is then
    /// reduced to the new member count.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokersPatch {
    #[serde(default)]
    pub add: BTreeSet<MemberId>,
    #[serde(default)]
    pub remove: BTreeSet<MemberId>,
    /// Replace the member set with ids `"0"..count`.
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionsPatch {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub replication_factor: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterPatchRequest {
    #[serde(default)]
    pub brokers: BrokersPatch,
    #[serde(default)]
    pub partitions: PartitionsPatch,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelChangeRequest {
    pub change_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ManagementRequest {
    AddMembers(AddMembersRequest),
    RemoveMembers(RemoveMembersRequest),
    JoinPartition(JoinPartitionRequest),
    LeavePartition(LeavePartitionRequest),
    ReassignPartitions(ReassignPartitionsRequest),
    Scale(ScaleRequest),
    ClusterPatch(ClusterPatchRequest),
    CancelChange(CancelChangeRequest),
    GetTopology,
}

impl ManagementRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ManagementRequest::AddMembers(_) => "add_members",
            ManagementRequest::RemoveMembers(_) => "remove_members",
            ManagementRequest::JoinPartition(_) => "join_partition",
            ManagementRequest::LeavePartition(_) => "leave_partition",
            ManagementRequest::ReassignPartitions(_) => "reassign_partitions",
            ManagementRequest::Scale(_) => "scale",
            ManagementRequest::ClusterPatch(_) => "cluster_patch",
            ManagementRequest::CancelChange(_) => "cancel_change",
            ManagementRequest::GetTopology => "get_topology",
        }
    }
}

/// Answer to every request that plans a topology change.
///
/// `change_id` is the id of the started change. When nothing was started (a
/// dry run or an empty plan) it is the version of `current_topology`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterChangeResponse {
    pub change_id: u64,
    pub current_topology: ClusterTopology,
    pub expected_topology: ClusterTopology,
    pub planned_changes: Vec<TopologyChangeOperation>,
}

impl ClusterChangeResponse {
    pub fn is_empty(&self) -> bool {
        self.planned_changes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum ManagementResponse {
    ClusterChange(ClusterChangeResponse),
    Topology(ClusterTopology),
}

/// What travels back over a transport: a response or an error payload.
pub type ManagementReply = std::result::Result<ManagementResponse, ErrorResponse>;
