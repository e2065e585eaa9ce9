use std::sync::Arc;

use async_trait::async_trait;

use super::{member_or_new, OperationApplier};
use crate::error::{Error, Result};
use crate::executor::MembershipChangeExecutor;
use crate::topology::{ClusterTopology, MemberId, MemberState, MemberStatus, MemberTransition};

/// Removes a member from the cluster: `Active` → `Leaving` → `Left`.
///
/// The member must have handed over all partitions first; the planner orders
/// partition leaves before the member leave.
pub struct MemberLeaveApplier {
    member: MemberId,
    executor: Arc<dyn MembershipChangeExecutor>,
}

impl MemberLeaveApplier {
    pub fn new(member: MemberId, executor: Arc<dyn MembershipChangeExecutor>) -> Self {
        Self { member, executor }
    }
}

#[async_trait]
impl OperationApplier for MemberLeaveApplier {
    fn init(&mut self, topology: &ClusterTopology) -> Result<MemberTransition> {
        let Some(existing) = topology.member(&self.member) else {
            return Err(Error::validation(format!(
                "Expected to remove member {}, but the member is not part of the cluster",
                self.member
            )));
        };

        match existing.state {
            MemberStatus::Active | MemberStatus::Leaving => {}
            state => {
                return Err(Error::validation(format!(
                    "Expected to remove member {}, but the member is in state {state:?}",
                    self.member
                )));
            }
        }

        if !existing.partitions.is_empty() {
            let held: Vec<String> = existing.partitions.keys().map(|p| p.to_string()).collect();
            return Err(Error::validation(format!(
                "Expected to remove member {}, but the member still holds partitions [{}]",
                self.member,
                held.join(", ")
            )));
        }

        Ok(Box::new(|member: Option<&MemberState>| match member {
            Some(m) if m.state == MemberStatus::Leaving => m.clone(),
            other => member_or_new(other).to_leaving(),
        }))
    }

    async fn apply(&self) -> Result<MemberTransition> {
        self.executor.remove_member(&self.member).await?;
        Ok(self.completion())
    }

    fn completion(&self) -> MemberTransition {
        Box::new(|member: Option<&MemberState>| member_or_new(member).to_left())
    }
}
