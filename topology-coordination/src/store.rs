mod etcd;

pub use etcd::{EtcdTopologyStore, StoreConfig};

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::topology::ClusterTopology;

/// Durable home of the topology.
///
/// The coordinator persists every update before publishing it, so a new
/// leader can resume a change that was in flight when the previous one died.
#[async_trait]
pub trait TopologyStore: Send + Sync {
    /// The last persisted topology, or `None` for a fresh cluster.
    async fn load(&self) -> Result<Option<ClusterTopology>>;

    async fn persist(&self, topology: &ClusterTopology) -> Result<()>;
}

/// Keeps the topology in process memory.
///
/// Survives coordinator hand-overs inside one process, which is what tests
/// and single-node deployments need.
#[derive(Default)]
pub struct InMemoryTopologyStore {
    topology: Mutex<Option<ClusterTopology>>,
}

impl InMemoryTopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topology(topology: ClusterTopology) -> Self {
        Self {
            topology: Mutex::new(Some(topology)),
        }
    }
}

#[async_trait]
impl TopologyStore for InMemoryTopologyStore {
    async fn load(&self) -> Result<Option<ClusterTopology>> {
        let guard = self
            .topology
            .lock()
            .map_err(|_| Error::invalid_state("topology store lock poisoned"))?;
        Ok(guard.clone())
    }

    async fn persist(&self, topology: &ClusterTopology) -> Result<()> {
        let mut guard = self
            .topology
            .lock()
            .map_err(|_| Error::invalid_state("topology store lock poisoned"))?;
        *guard = Some(topology.clone());
        Ok(())
    }
}
