use std::sync::Arc;

use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, Txn, TxnOp};

use super::TopologyStore;
use crate::error::{Error, Result};
use crate::serializer::TopologySerializer;
use crate::topology::ClusterTopology;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub endpoints: Vec<String>,
    /// Key prefix for all operations (e.g. "/topology/" or "/test-{uuid}/").
    pub prefix: String,
}

enum StoreKey {
    Topology,
    Leader,
}

impl StoreKey {
    fn resolve(&self, prefix: &str) -> String {
        match self {
            StoreKey::Topology => format!("{prefix}topology"),
            StoreKey::Leader => format!("{prefix}coordinator/leader"),
        }
    }
}

/// Stores the topology under a single etcd key.
///
/// A store created with [`EtcdTopologyStore::fenced`] only writes while the
/// leader key is still held by the given lease, so a deposed coordinator
/// cannot overwrite its successor's topology.
///
/// `Client` is `Clone` (it wraps an inner `Arc`), so each method clones it.
#[derive(Clone)]
pub struct EtcdTopologyStore {
    client: Client,
    config: StoreConfig,
    serializer: Arc<dyn TopologySerializer>,
    leader_lease: Option<i64>,
}

impl EtcdTopologyStore {
    pub async fn connect(
        config: StoreConfig,
        serializer: Arc<dyn TopologySerializer>,
    ) -> Result<Self> {
        let client = Client::connect(&config.endpoints, None).await?;
        Ok(Self::from_client(client, config, serializer))
    }

    pub fn from_client(
        client: Client,
        config: StoreConfig,
        serializer: Arc<dyn TopologySerializer>,
    ) -> Self {
        Self {
            client,
            config,
            serializer,
            leader_lease: None,
        }
    }

    /// A copy of this store whose writes require `lease_id` to own the leader key.
    pub fn fenced(&self, lease_id: i64) -> Self {
        Self {
            leader_lease: Some(lease_id),
            ..self.clone()
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Key the leader election writes its record to.
    pub fn leader_key(&self) -> String {
        self.key(StoreKey::Leader)
    }

    fn key(&self, k: StoreKey) -> String {
        k.resolve(&self.config.prefix)
    }
}

#[async_trait]
impl TopologyStore for EtcdTopologyStore {
    async fn load(&self) -> Result<Option<ClusterTopology>> {
        let resp = self
            .client
            .clone()
            .get(self.key(StoreKey::Topology), None)
            .await?;
        match resp.kvs().first() {
            Some(kv) => Ok(Some(self.serializer.decode_topology(kv.value())?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, topology: &ClusterTopology) -> Result<()> {
        let key = self.key(StoreKey::Topology);
        let value = self.serializer.encode_topology(topology)?;

        let Some(lease_id) = self.leader_lease else {
            self.client.clone().put(key, value, None).await?;
            return Ok(());
        };

        let txn = Txn::new()
            .when(vec![Compare::lease(
                self.key(StoreKey::Leader),
                CompareOp::Equal,
                lease_id,
            )])
            .and_then(vec![TxnOp::put(key, value, None)]);
        let resp = self.client.clone().txn(txn).await?;
        if !resp.succeeded() {
            tracing::warn!(
                lease_id,
                version = topology.version,
                "refusing to persist topology, leader key is held by another lease"
            );
            return Err(Error::LeadershipLost);
        }
        Ok(())
    }
}
