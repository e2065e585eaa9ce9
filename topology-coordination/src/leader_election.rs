//! Leader election for the change coordinator.
//!
//! Candidates race to create the leader key under a lease. The winner keeps
//! the lease alive and hands a [`LeadershipTerm`] to its work closure; the
//! term's lease id is what [`EtcdTopologyStore::fenced`] compares against, so
//! topology writes stop succeeding the moment another lease owns the key.

use std::future::Future;
use std::time::Duration;

use etcd_client::{Client, Compare, CompareOp, PutOptions, Txn, TxnOp, TxnOpResponse};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::store::EtcdTopologyStore;
use crate::util;

#[derive(Debug, Clone)]
pub struct LeaderElectionConfig {
    /// Name recorded in the leader key, e.g. the pod name.
    pub name: String,
    pub leader_key: String,
    /// Seconds the leader key outlives a leader that stopped renewing.
    pub lease_ttl: i64,
    pub keepalive_interval: Duration,
    /// Wait between campaigns after losing or failing one.
    pub retry_interval: Duration,
}

/// Value of the leader key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderRecord {
    pub holder: String,
    pub lease_id: i64,
    pub elected_at: i64,
}

/// One period of leadership, handed to the work closure.
#[derive(Debug, Clone)]
pub struct LeadershipTerm {
    /// Lease that owns the leader key.
    pub lease_id: i64,
    /// Cancelled when the lease can no longer be renewed.
    pub cancel: CancellationToken,
}

impl LeadershipTerm {
    /// A store whose writes only land while this term's lease holds the
    /// leader key.
    pub fn fence(&self, store: &EtcdTopologyStore) -> EtcdTopologyStore {
        store.fenced(self.lease_id)
    }
}

enum Campaign {
    Won,
    Lost(Option<LeaderRecord>),
}

/// Campaigns until `cancel` fires, running `work` for every term won.
pub async fn run_as_leader<F, Fut>(
    client: Client,
    config: LeaderElectionConfig,
    cancel: CancellationToken,
    work: F,
) -> Result<()>
where
    F: Fn(LeadershipTerm) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    while !cancel.is_cancelled() {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            outcome = serve_term(&client, &config, &cancel, &work) => outcome,
        };
        if let Err(e) = outcome {
            tracing::warn!(name = %config.name, error = %e, "leadership term failed");
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(config.retry_interval) => {}
        }
    }
    Ok(())
}

async fn serve_term<F, Fut>(
    client: &Client,
    config: &LeaderElectionConfig,
    cancel: &CancellationToken,
    work: &F,
) -> Result<()>
where
    F: Fn(LeadershipTerm) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let lease_id = client
        .clone()
        .lease_grant(config.lease_ttl, None)
        .await?
        .id();

    match campaign(client, config, lease_id).await? {
        Campaign::Won => {}
        Campaign::Lost(leader) => {
            match leader {
                Some(record) => tracing::debug!(
                    name = %config.name,
                    holder = %record.holder,
                    "standing by"
                ),
                None => tracing::debug!(name = %config.name, "standing by"),
            }
            drop(client.clone().lease_revoke(lease_id).await);
            return Ok(());
        }
    }
    tracing::info!(name = %config.name, lease_id, "elected leader");

    let term = LeadershipTerm {
        lease_id,
        cancel: cancel.child_token(),
    };
    let keepalive = tokio::spawn(hold_lease(
        client.clone(),
        lease_id,
        config.keepalive_interval,
        term.cancel.clone(),
    ));

    let result = work(term.clone()).await;

    term.cancel.cancel();
    drop(keepalive.await);
    drop(client.clone().lease_revoke(lease_id).await);
    tracing::info!(name = %config.name, lease_id, "leadership term ended");
    result
}

/// Creates the leader key if nobody holds it; otherwise reports the holder.
async fn campaign(
    client: &Client,
    config: &LeaderElectionConfig,
    lease_id: i64,
) -> Result<Campaign> {
    let record = LeaderRecord {
        holder: config.name.clone(),
        lease_id,
        elected_at: util::now_millis(),
    };
    let key = config.leader_key.as_str();

    let txn = Txn::new()
        .when(vec![Compare::version(key, CompareOp::Equal, 0)])
        .and_then(vec![TxnOp::put(
            key,
            serde_json::to_vec(&record)?,
            Some(PutOptions::new().with_lease(lease_id)),
        )])
        .or_else(vec![TxnOp::get(key, None)]);

    let resp = client.clone().txn(txn).await?;
    if resp.succeeded() {
        return Ok(Campaign::Won);
    }
    let holder = resp.op_responses().into_iter().find_map(|op| match op {
        TxnOpResponse::Get(get) => get.kvs().first().and_then(|kv| decode_record(kv.value())),
        _ => None,
    });
    Ok(Campaign::Lost(holder))
}

fn decode_record(value: &[u8]) -> Option<LeaderRecord> {
    serde_json::from_slice(value)
        .inspect_err(|e| tracing::warn!(error = %e, "unreadable leader record"))
        .ok()
}

/// Renews the lease until `cancel` fires. Cancels `cancel` itself when the
/// lease is gone, which ends the term.
async fn hold_lease(
    client: Client,
    lease_id: i64,
    interval: Duration,
    cancel: CancellationToken,
) {
    if let Err(e) = renew_lease(client, lease_id, interval, &cancel).await {
        tracing::error!(lease_id, error = %e, "lost leader lease");
        cancel.cancel();
    }
}

async fn renew_lease(
    mut client: Client,
    lease_id: i64,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let (mut keeper, mut responses) = client.lease_keep_alive(lease_id).await?;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
        keeper.keep_alive().await?;
        match responses.message().await? {
            Some(resp) if resp.ttl() > 0 => {}
            _ => return Err(Error::LeadershipLost),
        }
    }
}
