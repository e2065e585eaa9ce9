use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type PartitionId = u32;

/// Identifier of a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for MemberId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle of a member in the cluster.
///
/// ```text
/// Joining → Active → Leaving → Left
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    Joining,
    Active,
    Leaving,
    /// Kept in the topology as a record; not eligible for partitions.
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionStatus {
    Joining,
    Active,
    Leaving,
}

/// A member's replica of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionState {
    pub state: PartitionStatus,
    /// Leader preference; higher is preferred.
    pub priority: u32,
}

impl PartitionState {
    pub fn joining(priority: u32) -> Self {
        Self {
            state: PartitionStatus::Joining,
            priority,
        }
    }

    pub fn active(priority: u32) -> Self {
        Self {
            state: PartitionStatus::Active,
            priority,
        }
    }

    pub fn to_leaving(self) -> Self {
        Self {
            state: PartitionStatus::Leaving,
            ..self
        }
    }

    pub fn to_active(self) -> Self {
        Self {
            state: PartitionStatus::Active,
            ..self
        }
    }

    pub fn with_priority(self, priority: u32) -> Self {
        Self { priority, ..self }
    }
}

/// State of one member. Every `with_*`/`to_*` returns a new value with the
/// member version bumped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    pub version: u64,
    pub state: MemberStatus,
    #[serde(with = "partition_entries")]
    pub partitions: BTreeMap<PartitionId, PartitionState>,
}

/// Encodes partitions as `[[id, state], ...]`. Integer map keys become JSON
/// strings, which do not decode back inside tagged enums.
mod partition_entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{PartitionId, PartitionState};

    pub fn serialize<S>(
        value: &BTreeMap<PartitionId, PartitionState>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(value.iter())
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<PartitionId, PartitionState>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<(PartitionId, PartitionState)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

impl MemberState {
    pub fn joining() -> Self {
        Self {
            version: 0,
            state: MemberStatus::Joining,
            partitions: BTreeMap::new(),
        }
    }

    /// A member that is already part of the cluster, e.g. when seeding a
    /// topology from static configuration.
    pub fn active(partitions: BTreeMap<PartitionId, PartitionState>) -> Self {
        Self {
            version: 0,
            state: MemberStatus::Active,
            partitions,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == MemberStatus::Active
    }

    pub fn has_left(&self) -> bool {
        self.state == MemberStatus::Left
    }

    pub fn has_partition(&self, partition: PartitionId) -> bool {
        self.partitions.contains_key(&partition)
    }

    pub fn get_partition(&self, partition: PartitionId) -> Option<&PartitionState> {
        self.partitions.get(&partition)
    }

    pub fn with_state(&self, state: MemberStatus) -> Self {
        Self {
            version: self.version + 1,
            state,
            partitions: self.partitions.clone(),
        }
    }

    pub fn to_active(&self) -> Self {
        self.with_state(MemberStatus::Active)
    }

    pub fn to_leaving(&self) -> Self {
        self.with_state(MemberStatus::Leaving)
    }

    pub fn to_left(&self) -> Self {
        self.with_state(MemberStatus::Left)
    }

    pub fn with_partition(&self, partition: PartitionId, state: PartitionState) -> Self {
        let mut partitions = self.partitions.clone();
        partitions.insert(partition, state);
        Self {
            version: self.version + 1,
            state: self.state,
            partitions,
        }
    }

    /// Applies `f` to an existing partition; a missing partition leaves the
    /// member untouched.
    pub fn update_partition(
        &self,
        partition: PartitionId,
        f: impl FnOnce(PartitionState) -> PartitionState,
    ) -> Self {
        match self.partitions.get(&partition) {
            Some(current) => self.with_partition(partition, f(*current)),
            None => self.clone(),
        }
    }

    pub fn without_partition(&self, partition: PartitionId) -> Self {
        let mut partitions = self.partitions.clone();
        partitions.remove(&partition);
        Self {
            version: self.version + 1,
            state: self.state,
            partitions,
        }
    }
}
