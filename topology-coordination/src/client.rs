use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{
    AddMembersRequest, CancelChangeRequest, ClusterChangeResponse, ClusterPatchRequest,
    JoinPartitionRequest, LeavePartitionRequest, ManagementRequest, ManagementResponse,
    ReassignPartitionsRequest, RemoveMembersRequest, ScaleRequest,
};
use crate::error::{Error, Result};
use crate::topology::{ClusterTopology, MemberId, PartitionId};
use crate::transport::RequestTransport;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Member that runs the coordinator.
    pub target: MemberId,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

/// Typed management API over a [`RequestTransport`].
pub struct ManagementClient {
    transport: Arc<dyn RequestTransport>,
    config: ClientConfig,
}

impl ManagementClient {
    pub fn new(transport: Arc<dyn RequestTransport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub async fn send(&self, request: ManagementRequest) -> Result<ManagementResponse> {
        self.transport
            .send_with_retry(&self.config.target, request, self.config.request_timeout)
            .await
    }

    async fn send_change(&self, request: ManagementRequest) -> Result<ClusterChangeResponse> {
        match self.send(request).await? {
            ManagementResponse::ClusterChange(response) => Ok(response),
            ManagementResponse::Topology(_) => Err(Error::invalid_state(
                "expected a cluster change response, got a topology",
            )),
        }
    }

    async fn send_topology(&self, request: ManagementRequest) -> Result<ClusterTopology> {
        match self.send(request).await? {
            ManagementResponse::Topology(topology) => Ok(topology),
            ManagementResponse::ClusterChange(_) => Err(Error::invalid_state(
                "expected a topology, got a cluster change response",
            )),
        }
    }

    pub async fn get_topology(&self) -> Result<ClusterTopology> {
        self.send_topology(ManagementRequest::GetTopology).await
    }

    pub async fn cancel_change(&self, change_id: u64) -> Result<ClusterTopology> {
        self.send_topology(ManagementRequest::CancelChange(CancelChangeRequest { change_id }))
            .await
    }

    pub async fn add_members(
        &self,
        members: BTreeSet<MemberId>,
        dry_run: bool,
    ) -> Result<ClusterChangeResponse> {
        self.send_change(ManagementRequest::AddMembers(AddMembersRequest {
            members,
            dry_run,
        }))
        .await
    }

    pub async fn remove_members(
        &self,
        members: Vec<MemberId>,
        dry_run: bool,
    ) -> Result<ClusterChangeResponse> {
        self.send_change(ManagementRequest::RemoveMembers(RemoveMembersRequest {
            members,
            dry_run,
        }))
        .await
    }

    pub async fn join_partition(
        &self,
        member: MemberId,
        partition: PartitionId,
        priority: u32,
        dry_run: bool,
    ) -> Result<ClusterChangeResponse> {
        self.send_change(ManagementRequest::JoinPartition(JoinPartitionRequest {
            member,
            partition,
            priority,
            dry_run,
        }))
        .await
    }

    pub async fn leave_partition(
        &self,
        member: MemberId,
        partition: PartitionId,
        dry_run: bool,
    ) -> Result<ClusterChangeResponse> {
        self.send_change(ManagementRequest::LeavePartition(LeavePartitionRequest {
            member,
            partition,
            dry_run,
        }))
        .await
    }

    pub async fn reassign_partitions(
        &self,
        members: BTreeSet<MemberId>,
        dry_run: bool,
    ) -> Result<ClusterChangeResponse> {
        self.send_change(ManagementRequest::ReassignPartitions(
            ReassignPartitionsRequest { members, dry_run },
        ))
        .await
    }

    pub async fn scale(&self, request: ScaleRequest) -> Result<ClusterChangeResponse> {
        self.send_change(ManagementRequest::Scale(request)).await
    }

    pub async fn patch_cluster(&self, request: ClusterPatchRequest) -> Result<ClusterChangeResponse> {
        self.send_change(ManagementRequest::ClusterPatch(request)).await
    }

    /// Polls the topology until change `change_id` is no longer in flight.
    ///
    /// A transport timeout while polling is not fatal; the next poll retries
    /// until `deadline` passes.
    pub async fn await_completion(
        &self,
        change_id: u64,
        deadline: Duration,
    ) -> Result<ClusterTopology> {
        let start = tokio::time::Instant::now();
        loop {
            match self.get_topology().await {
                Ok(topology) if topology.has_completed_changes(change_id) => return Ok(topology),
                Ok(_) => {}
                Err(Error::TransportTimeout(elapsed)) => {
                    tracing::debug!(change_id, ?elapsed, "topology poll timed out");
                }
                Err(e) => return Err(e),
            }
            if start.elapsed() >= deadline {
                return Err(Error::TransportTimeout(deadline));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
