use std::sync::Arc;

use async_trait::async_trait;

use super::{member_or_new, OperationApplier};
use crate::error::{Error, Result};
use crate::executor::MembershipChangeExecutor;
use crate::topology::{ClusterTopology, MemberId, MemberState, MemberStatus, MemberTransition};

/// Adds a member to the cluster: absent (or left) → `Joining` → `Active`.
pub struct MemberJoinApplier {
    member: MemberId,
    executor: Arc<dyn MembershipChangeExecutor>,
}

impl MemberJoinApplier {
    pub fn new(member: MemberId, executor: Arc<dyn MembershipChangeExecutor>) -> Self {
        Self { member, executor }
    }
}

#[async_trait]
impl OperationApplier for MemberJoinApplier {
    fn init(&mut self, topology: &ClusterTopology) -> Result<MemberTransition> {
        if let Some(existing) = topology.member(&self.member) {
            match existing.state {
                MemberStatus::Joining | MemberStatus::Left => {}
                MemberStatus::Active | MemberStatus::Leaving => {
                    return Err(Error::validation(format!(
                        "Expected to join member {}, but the member is already part of the cluster in state {:?}",
                        self.member, existing.state
                    )));
                }
            }
        }

        Ok(Box::new(|member: Option<&MemberState>| match member {
            Some(m) if m.state == MemberStatus::Joining => m.clone(),
            Some(m) => m.with_state(MemberStatus::Joining),
            None => MemberState::joining(),
        }))
    }

    async fn apply(&self) -> Result<MemberTransition> {
        self.executor.add_member(&self.member).await?;
        Ok(self.completion())
    }

    fn completion(&self) -> MemberTransition {
        Box::new(|member: Option<&MemberState>| member_or_new(member).to_active())
    }
}
