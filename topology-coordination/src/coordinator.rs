//! Runs topology changes.
//!
//! A [`ChangeCoordinator`] is created when this process becomes leader and
//! shut down when leadership ends. It is the only writer of the topology:
//! every update goes through one lock that covers read, modify, persist and
//! publish, so readers only ever see persisted snapshots.
//!
//! Each member with pending operations gets a driver task. A driver executes
//! its member's operations one at a time in plan order; drivers of different
//! members run concurrently, except that an operation waits while an earlier
//! operation of another member on the same partition is still pending.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::applier::{get_applier, simulate_operations};
use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::executor::Executors;
use crate::store::TopologyStore;
use crate::topology::{ClusterTopology, MemberId, TopologyChangeOperation};
use crate::util;

#[derive(Clone)]
pub struct ChangeCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TopologyStore>,
    executors: Executors,
    config: CoordinatorConfig,
    writer: Mutex<()>,
    topology: watch::Sender<Arc<ClusterTopology>>,
    cancel: CancellationToken,
    drivers: TaskTracker,
}

impl ChangeCoordinator {
    /// Loads the persisted topology (or starts from an empty one) and resumes
    /// a change that was in flight under the previous leader.
    pub async fn start(
        store: Arc<dyn TopologyStore>,
        executors: Executors,
        config: CoordinatorConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let topology = store.load().await?.unwrap_or_default();
        tracing::info!(
            version = topology.version,
            members = topology.members.len(),
            pending = topology.has_pending_changes(),
            "change coordinator started"
        );

        let (sender, _) = watch::channel(Arc::new(topology));
        let coordinator = Self {
            inner: Arc::new(Inner {
                store,
                executors,
                config,
                writer: Mutex::new(()),
                topology: sender,
                cancel,
                drivers: TaskTracker::new(),
            }),
        };

        let current = coordinator.get_current_topology();
        if let Some(change) = current.pending_change() {
            tracing::info!(
                change_id = change.id,
                pending = change.pending.len(),
                "resuming topology change"
            );
            coordinator.spawn_drivers(&current);
        }
        Ok(coordinator)
    }

    pub fn get_current_topology(&self) -> Arc<ClusterTopology> {
        self.inner.current()
    }

    pub fn has_completed_changes(&self, version: u64) -> bool {
        self.inner.current().has_completed_changes(version)
    }

    /// Projects the topology `operations` would produce, validating each
    /// operation against the result of the ones before it.
    pub fn simulate(
        &self,
        topology: &ClusterTopology,
        operations: &[TopologyChangeOperation],
    ) -> Result<ClusterTopology> {
        simulate_operations(
            topology,
            operations,
            &self.inner.executors,
            &self.inner.config.applier,
        )
    }

    /// Validates `operations` as a whole and starts them as one change.
    ///
    /// Fails with `ConcurrentChange` while another change is in flight and
    /// with `Validation` if any operation would be rejected; in both cases the
    /// topology is left untouched. Returns the topology with the started
    /// change; execution continues in the background.
    pub async fn apply_operations(
        &self,
        operations: Vec<TopologyChangeOperation>,
    ) -> Result<Arc<ClusterTopology>> {
        self.start_change(None, operations).await
    }

    /// Like [`apply_operations`](Self::apply_operations), for operations
    /// planned against topology `version`. Fails with `StaleTopology` if the
    /// topology has moved on since.
    pub async fn apply_operations_at(
        &self,
        version: u64,
        operations: Vec<TopologyChangeOperation>,
    ) -> Result<Arc<ClusterTopology>> {
        self.start_change(Some(version), operations).await
    }

    async fn start_change(
        &self,
        planned_at: Option<u64>,
        operations: Vec<TopologyChangeOperation>,
    ) -> Result<Arc<ClusterTopology>> {
        let coordinator = self.clone();
        self.write(async move {
            let started = coordinator
                .inner
                .update(|current| {
                    if let Some(change) = current.pending_change() {
                        return Err(Error::ConcurrentChange {
                            change_id: change.id,
                        });
                    }
                    if let Some(expected) = planned_at.filter(|v| *v != current.version) {
                        return Err(Error::StaleTopology {
                            expected,
                            actual: current.version,
                        });
                    }
                    coordinator.simulate(current, &operations)?;
                    current.start_topology_change(operations, util::now_millis())
                })
                .await?;

            if let Some(change) = started.pending_change() {
                tracing::info!(
                    change_id = change.id,
                    operations = change.pending.len(),
                    "topology change started"
                );
            }
            coordinator.spawn_drivers(&started);
            Ok(started)
        })
        .await
    }

    /// Stops change `change_id`. Operations already completed stay applied.
    pub async fn cancel_change(&self, change_id: u64) -> Result<Arc<ClusterTopology>> {
        let inner = Arc::clone(&self.inner);
        let cancelled = self
            .write(async move {
                inner
                    .update(|current| current.cancel_topology_change(change_id, util::now_millis()))
                    .await
            })
            .await?;
        tracing::warn!(change_id, "topology change cancelled");
        Ok(cancelled)
    }

    /// Resolves once change `change_id` is no longer in flight.
    pub async fn await_change_completion(&self, change_id: u64) -> Result<Arc<ClusterTopology>> {
        let mut updates = self.inner.topology.subscribe();
        loop {
            let topology = updates.borrow_and_update().clone();
            if topology.has_completed_changes(change_id) {
                return Ok(topology);
            }
            tokio::select! {
                _ = self.inner.cancel.cancelled() => {
                    return Err(Error::Unavailable("coordinator shut down".to_string()));
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        return Err(Error::Unavailable("coordinator shut down".to_string()));
                    }
                }
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Stops all drivers and waits for them to exit. In-flight operations
    /// stay pending for the next coordinator.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.drivers.close();
        self.inner.drivers.wait().await;
        tracing::info!("change coordinator stopped");
    }

    /// Runs a write on the coordinator's own tracker. A caller that stops
    /// waiting (a request timeout, a dropped connection) cannot interrupt it
    /// between persist and publish.
    async fn write<T, F>(&self, write: F) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.inner
            .drivers
            .spawn(write)
            .await
            .map_err(|e| Error::execution(format!("topology write aborted: {e}")))?
    }

    fn spawn_drivers(&self, topology: &ClusterTopology) {
        let Some(change) = topology.pending_change() else {
            return;
        };
        for member in change.members_with_pending() {
            let inner = Arc::clone(&self.inner);
            let change_id = change.id;
            self.inner
                .drivers
                .spawn(async move { inner.drive_member(change_id, member).await });
        }
    }
}

impl Inner {
    fn current(&self) -> Arc<ClusterTopology> {
        self.topology.borrow().clone()
    }

    /// The single write path: read, modify, persist, publish.
    async fn update<F>(&self, f: F) -> Result<Arc<ClusterTopology>>
    where
        F: FnOnce(&ClusterTopology) -> Result<ClusterTopology> + Send,
    {
        let _guard = self.writer.lock().await;
        if self.cancel.is_cancelled() {
            return Err(Error::Unavailable("coordinator shut down".to_string()));
        }

        let current = self.current();
        let updated = f(&current)?;
        self.store.persist(&updated).await?;

        let updated = Arc::new(updated);
        self.topology.send_replace(Arc::clone(&updated));
        Ok(updated)
    }

    async fn drive_member(&self, change_id: u64, member: MemberId) {
        let mut updates = self.topology.subscribe();
        loop {
            let topology = updates.borrow_and_update().clone();
            let Some(change) = topology.pending_change().filter(|c| c.id == change_id) else {
                return;
            };
            let Some(operation) = change.next_pending_operation(&member).cloned() else {
                return;
            };

            if !change.is_runnable(&member) {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
                continue;
            }

            match self.run_operation(change_id, &member, &operation).await {
                Ok(()) => {}
                Err(Error::InvalidState(reason)) => {
                    tracing::debug!(member = %member, change_id, %reason, "operation superseded");
                }
                Err(e @ (Error::Validation(_) | Error::LeadershipLost | Error::Unavailable(_))) => {
                    tracing::error!(
                        member = %member,
                        change_id,
                        %operation,
                        error = %e,
                        "halting member, operation stays pending"
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        member = %member,
                        change_id,
                        %operation,
                        error = %e,
                        "operation failed, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(self.config.apply_retry_interval) => {}
                    }
                }
            }
        }
    }

    async fn run_operation(
        &self,
        change_id: u64,
        member: &MemberId,
        operation: &TopologyChangeOperation,
    ) -> Result<()> {
        let mut applier = get_applier(operation, &self.executors, &self.config.applier);

        self.update(|current| {
            ensure_next(current, change_id, member, operation)?;
            let started = applier.init(current)?;
            Ok(current.update_member(member, &started))
        })
        .await?;

        let completion = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(Error::Unavailable("coordinator shut down".to_string()));
            }
            result = applier.apply() => result?,
        };

        let advanced = self
            .update(|current| {
                ensure_next(current, change_id, member, operation)?;
                current.advance_topology_change(member, &completion, util::now_millis())
            })
            .await?;

        tracing::info!(member = %member, change_id, %operation, "operation completed");
        if !advanced.has_pending_changes() {
            tracing::info!(change_id, version = advanced.version, "topology change completed");
        }
        Ok(())
    }
}

/// The change may have been cancelled (or replaced) while the operation ran.
fn ensure_next(
    topology: &ClusterTopology,
    change_id: u64,
    member: &MemberId,
    operation: &TopologyChangeOperation,
) -> Result<()> {
    match topology.pending_change() {
        Some(change)
            if change.id == change_id
                && change.next_pending_operation(member) == Some(operation) =>
        {
            Ok(())
        }
        _ => Err(Error::invalid_state(format!(
            "{operation} is no longer pending in change {change_id}"
        ))),
    }
}
