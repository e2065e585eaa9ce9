use std::collections::BTreeSet;
use std::sync::Arc;

use envconfig::Envconfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use topology_coordination::config::Config;
use topology_coordination::coordinator::ChangeCoordinator;
use topology_coordination::error::Result;
use topology_coordination::executor::Executors;
use topology_coordination::leader_election::{self, LeadershipTerm};
use topology_coordination::planner::RequestPlanner;
use topology_coordination::serializer::{JsonSerializer, TopologySerializer};
use topology_coordination::service::ManagementService;
use topology_coordination::store::{EtcdTopologyStore, TopologyStore};
use topology_coordination::topology::MemberId;

async fn shutdown_signal() -> std::io::Result<()> {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
    Ok(())
}

/// Seeds an empty store from the initial topology settings, if any.
async fn seed_topology(
    store: &EtcdTopologyStore,
    planner: &RequestPlanner,
    config: &Config,
) -> Result<()> {
    let members: BTreeSet<MemberId> = config
        .initial_member_list()
        .into_iter()
        .map(MemberId::from)
        .collect();
    if members.is_empty() || store.load().await?.is_some() {
        return Ok(());
    }

    let topology = planner.initial_topology(
        &members,
        config.initial_partition_count,
        config.initial_replication_factor,
    )?;
    store.persist(&topology).await?;
    tracing::info!(
        members = members.len(),
        partitions = config.initial_partition_count,
        replication_factor = config.initial_replication_factor,
        "seeded initial topology"
    );
    Ok(())
}

async fn lead(
    term: LeadershipTerm,
    store: EtcdTopologyStore,
    service: Arc<ManagementService>,
    config: Config,
) -> Result<()> {
    let store = term.fence(&store);
    seed_topology(&store, &RequestPlanner::default(), &config).await?;

    let coordinator = ChangeCoordinator::start(
        Arc::new(store),
        Executors::noop(),
        config.coordinator_config(),
        term.cancel.child_token(),
    )
    .await?;
    service.install(coordinator.clone()).await;

    term.cancel.cancelled().await;

    service.uninstall().await;
    coordinator.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = Config::init_from_env()?;

    let log_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(log_layer)
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    tracing::info!("Starting topology-coordinator");
    tracing::info!("etcd endpoints: {}", config.etcd_endpoints);
    tracing::info!("etcd prefix: {}", config.etcd_prefix);
    tracing::info!("Coordinator name: {}", config.coordinator_name);

    let serializer: Arc<dyn TopologySerializer> = Arc::new(JsonSerializer);
    let store = EtcdTopologyStore::connect(config.store_config(), serializer).await?;
    let leader_key = store.leader_key();

    let service = Arc::new(ManagementService::new(RequestPlanner::default()));
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => cancel.cancel(),
                Err(e) => tracing::error!(error = %e, "failed to install signal handlers"),
            }
        });
    }

    leader_election::run_as_leader(
        store.client().clone(),
        config.election_config(leader_key),
        cancel,
        |term| lead(term, store.clone(), Arc::clone(&service), config.clone()),
    )
    .await?;

    Ok(())
}
