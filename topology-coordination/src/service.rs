use tokio::sync::RwLock;

use crate::api::{ClusterChangeResponse, ManagementReply, ManagementRequest, ManagementResponse};
use crate::coordinator::ChangeCoordinator;
use crate::error::{Error, ErrorResponse, Result};
use crate::planner::RequestPlanner;
use crate::topology::{ClusterTopology, TopologyChangeOperation};

/// Entry point for management requests.
///
/// Holds the coordinator of the current leadership term, if this process is
/// leader. Requests arriving while no coordinator is installed fail with
/// `Unavailable`.
pub struct ManagementService {
    planner: RequestPlanner,
    coordinator: RwLock<Option<ChangeCoordinator>>,
}

impl ManagementService {
    pub fn new(planner: RequestPlanner) -> Self {
        Self {
            planner,
            coordinator: RwLock::new(None),
        }
    }

    pub async fn install(&self, coordinator: ChangeCoordinator) {
        *self.coordinator.write().await = Some(coordinator);
        tracing::info!("management service accepting requests");
    }

    pub async fn uninstall(&self) -> Option<ChangeCoordinator> {
        let previous = self.coordinator.write().await.take();
        if previous.is_some() {
            tracing::info!("management service stopped accepting requests");
        }
        previous
    }

    async fn coordinator(&self) -> Result<ChangeCoordinator> {
        match self.coordinator.read().await.as_ref() {
            Some(coordinator) if !coordinator.is_shut_down() => Ok(coordinator.clone()),
            _ => Err(Error::Unavailable(
                "no coordinator installed, this member is not leader".to_string(),
            )),
        }
    }

    pub async fn handle(&self, request: ManagementRequest) -> Result<ManagementResponse> {
        tracing::debug!(request = request.name(), "handling management request");
        let coordinator = self.coordinator().await?;
        let planner = &self.planner;

        match request {
            ManagementRequest::GetTopology => Ok(ManagementResponse::Topology(
                ClusterTopology::clone(&coordinator.get_current_topology()),
            )),
            ManagementRequest::CancelChange(r) => {
                let cancelled = coordinator.cancel_change(r.change_id).await?;
                Ok(ManagementResponse::Topology(ClusterTopology::clone(&cancelled)))
            }
            ManagementRequest::AddMembers(r) => {
                change(&coordinator, r.dry_run, |t| planner.add_members(t, &r.members)).await
            }
            ManagementRequest::RemoveMembers(r) => {
                change(&coordinator, r.dry_run, |t| planner.remove_members(t, &r.members)).await
            }
            ManagementRequest::JoinPartition(r) => {
                change(&coordinator, r.dry_run, |_| {
                    planner.join_partition(&r.member, r.partition, r.priority)
                })
                .await
            }
            ManagementRequest::LeavePartition(r) => {
                change(&coordinator, r.dry_run, |_| {
                    planner.leave_partition(&r.member, r.partition)
                })
                .await
            }
            ManagementRequest::ReassignPartitions(r) => {
                change(&coordinator, r.dry_run, |t| {
                    planner.reassign_partitions(t, &r.members)
                })
                .await
            }
            ManagementRequest::Scale(r) => {
                change(&coordinator, r.dry_run, |t| {
                    planner.scale_members(t, &r.members, r.replication_factor, r.force)
                })
                .await
            }
            ManagementRequest::ClusterPatch(r) => {
                change(&coordinator, r.dry_run, |t| planner.patch_cluster(t, &r)).await
            }
        }
    }

    /// Like [`handle`](Self::handle), with errors turned into wire payloads.
    pub async fn handle_reply(&self, request: ManagementRequest) -> ManagementReply {
        let name = request.name();
        self.handle(request).await.map_err(|e| {
            tracing::warn!(request = name, error = %e, "management request rejected");
            ErrorResponse::from(&e)
        })
    }
}

/// Plans against a fresh snapshot, projects the outcome and, unless this is a
/// dry run or there is nothing to do, starts the change. The start is refused
/// if another write landed after the snapshot was taken.
async fn change<F>(
    coordinator: &ChangeCoordinator,
    dry_run: bool,
    plan: F,
) -> Result<ManagementResponse>
where
    F: FnOnce(&ClusterTopology) -> Result<Vec<TopologyChangeOperation>>,
{
    let current = coordinator.get_current_topology();
    if let Some(change) = current.pending_change() {
        return Err(Error::ConcurrentChange {
            change_id: change.id,
        });
    }

    let planned_changes = plan(&current)?;
    let expected_topology = coordinator.simulate(&current, &planned_changes)?;

    let change_id = if dry_run || planned_changes.is_empty() {
        current.version
    } else {
        let started = coordinator
            .apply_operations_at(current.version, planned_changes.clone())
            .await?;
        started
            .pending_change()
            .map_or(started.version, |change| change.id)
    };

    Ok(ManagementResponse::ClusterChange(ClusterChangeResponse {
        change_id,
        current_topology: ClusterTopology::clone(&current),
        expected_topology,
        planned_changes,
    }))
}
