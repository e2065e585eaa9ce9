use std::time::Duration;

use envconfig::Envconfig;

use crate::applier::ApplierConfig;
use crate::leader_election::LeaderElectionConfig;
use crate::store::StoreConfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    // ── etcd ────────────────────────────────────────────────────────
    #[envconfig(default = "http://localhost:2379")]
    pub etcd_endpoints: String,

    #[envconfig(default = "/topology/")]
    pub etcd_prefix: String,

    // ── Leader election ─────────────────────────────────────────────
    #[envconfig(default = "coordinator-0")]
    pub coordinator_name: String,

    #[envconfig(default = "15")]
    pub leader_lease_ttl_secs: i64,

    #[envconfig(default = "5")]
    pub leader_keepalive_interval_secs: u64,

    #[envconfig(default = "5")]
    pub election_retry_interval_secs: u64,

    // ── Change coordination ─────────────────────────────────────────
    #[envconfig(default = "1000")]
    pub apply_retry_interval_ms: u64,

    #[envconfig(default = "1")]
    pub minimum_replicas: usize,

    // ── Initial topology, used when the store holds none ────────────
    #[envconfig(default = "")]
    pub initial_members: String,

    #[envconfig(default = "0")]
    pub initial_partition_count: u32,

    #[envconfig(default = "1")]
    pub initial_replication_factor: usize,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn etcd_endpoint_list(&self) -> Vec<String> {
        split_list(&self.etcd_endpoints)
    }

    pub fn initial_member_list(&self) -> Vec<String> {
        split_list(&self.initial_members)
    }

    pub fn leader_keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.leader_keepalive_interval_secs)
    }

    pub fn election_retry_interval(&self) -> Duration {
        Duration::from_secs(self.election_retry_interval_secs)
    }

    pub fn apply_retry_interval(&self) -> Duration {
        Duration::from_millis(self.apply_retry_interval_ms)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            endpoints: self.etcd_endpoint_list(),
            prefix: self.etcd_prefix.clone(),
        }
    }

    pub fn election_config(&self, leader_key: String) -> LeaderElectionConfig {
        LeaderElectionConfig {
            name: self.coordinator_name.clone(),
            leader_key,
            lease_ttl: self.leader_lease_ttl_secs,
            keepalive_interval: self.leader_keepalive_interval(),
            retry_interval: self.election_retry_interval(),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            apply_retry_interval: self.apply_retry_interval(),
            applier: ApplierConfig {
                minimum_replicas: self.minimum_replicas,
            },
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Wait between attempts of an operation whose executor failed.
    pub apply_retry_interval: Duration,
    pub applier: ApplierConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            apply_retry_interval: Duration::from_secs(1),
            applier: ApplierConfig::default(),
        }
    }
}
