//! Streamgate gateway node.
//!
//! Holds SSE sessions for clients and shares their metadata with the rest of
//! the cluster through the session store.
//!
//! # Store
//!
//! `STORE_BACKEND=rocksdb` (default) keeps sessions in an embedded database
//! under `DATA_DIR`, which only makes sense for a single node.
//! `STORE_BACKEND=redis` shares them through `REDIS_URL`.
//!
//! # Membership
//!
//! `MEMBERSHIP_BACKEND` selects how peers are discovered: `static` (this node
//! only), `nacos` or `kubernetes`. With Nacos the node registers itself once
//! ready and deregisters on shutdown unless `CLUSTER_REGISTER=false`.

use std::error::Error;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use streamgate_cluster::{
    connect_membership, detect_local_host, MembershipBackend, NodeDirectory, SelfRegistration,
};
use streamgate_control::{
    HttpPeerClient, PrefixWhitelist, ReferenceRegistry, SessionManager, SessionReaper,
    StaticCatalog, TcpConnector, WarmupConfig, WarmupOrchestrator,
};
use streamgate_core::NodeAddress;
use streamgate_gateway::{create_router, serve, GatewayConfig, GatewayState, StoreBackend};
use streamgate_store::{RedisStore, RocksStore, SessionStore};

const DEFAULT_LOG_FILTER: &str = "info,streamgate=debug";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = GatewayConfig::from_env()?;

    // RUST_LOG wins, then LOG_LEVEL, then the built-in default.
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        if std::env::var_os("LOG_LEVEL").is_some() {
            EnvFilter::try_new(&config.log_level)
        } else {
            EnvFilter::try_new(DEFAULT_LOG_FILTER)
        }
    })?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting streamgate gateway");

    let host = config
        .advertise_host
        .clone()
        .unwrap_or_else(detect_local_host);
    let port = config.listen_port().unwrap_or(config.cluster.peer_port);
    let local = NodeAddress::new(host, port);

    tracing::info!(
        listen_addr = %config.listen_addr,
        node = %local,
        store_backend = ?config.store_backend,
        membership_backend = ?config.cluster.backend,
        "Gateway configuration loaded"
    );

    match config.store_backend {
        StoreBackend::Rocksdb => {
            tracing::info!(path = %config.data_dir.display(), "Opening RocksDB store");
            let store = Arc::new(RocksStore::open(&config.data_dir)?);
            run(store, config, local).await
        }
        StoreBackend::Redis => {
            let store = Arc::new(RedisStore::connect(config.redis.clone()).await?);
            run(store, config, local).await
        }
    }
}

async fn run<S: SessionStore + 'static>(
    store: Arc<S>,
    config: GatewayConfig,
    local: NodeAddress,
) -> Result<(), Box<dyn Error>> {
    let membership = connect_membership(&config.cluster).await?;
    // Only Nacos needs to be told about us; Kubernetes lists pods directly.
    let announce =
        config.cluster.register_self && config.cluster.backend == MembershipBackend::Nacos;
    let registration = announce.then(|| {
        Arc::new(SelfRegistration::new(
            Arc::clone(&membership),
            &config.cluster,
            &local,
        ))
    });
    let directory = Arc::new(NodeDirectory::new(
        membership,
        config.cluster.clone(),
        local.clone(),
    ));

    let peer = Arc::new(HttpPeerClient::new(config.cluster.request_timeout)?);
    let manager = Arc::new(SessionManager::new(store, local, peer, config.session()));

    let orphans = manager.reconcile_orphans().await;
    tracing::info!(orphans, "Startup reconciliation finished");

    let reaper = Arc::new(SessionReaper::new(Arc::clone(&manager), config.reaper()));
    reaper.spawn();

    let (ready_tx, ready_rx) = oneshot::channel();
    let warmup = config.warmup();
    if warmup.enabled {
        build_warmup(&warmup).spawn(ready_rx);
    } else {
        tracing::info!("Warmup disabled");
    }

    let state = GatewayState::new(Arc::clone(&manager), directory, config.clone());
    let ready_state = state.clone();
    let app = create_router(state);

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;

    ready_state.mark_ready();
    // Err only means warmup is disabled and nobody is listening.
    let _ = ready_tx.send(());
    tracing::info!("Gateway ready");

    let mut heartbeat = None;
    if let Some(registration) = &registration {
        match registration.register().await {
            Ok(()) => heartbeat = Some(Arc::clone(registration).spawn_heartbeat()),
            Err(e) => tracing::error!(error = %e, "Failed to register gateway node"),
        }
    }

    let signal = async move {
        shutdown_signal().await;
        // A beat after deregistration would put the instance back.
        if let Some(heartbeat) = heartbeat {
            heartbeat.abort();
        }
        if let Some(registration) = registration {
            if let Err(e) = registration.deregister().await {
                tracing::warn!(error = %e, "Failed to deregister gateway node");
            }
        }
    };
    serve(listener, app, manager, signal).await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

fn build_warmup(config: &WarmupConfig) -> Arc<WarmupOrchestrator> {
    let catalog = match &config.catalog_path {
        Some(path) => StaticCatalog::from_file(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load service catalog, warming nothing");
            StaticCatalog::empty()
        }),
        None => StaticCatalog::empty(),
    };
    let registry = Arc::new(ReferenceRegistry::new(Arc::new(TcpConnector::new(
        config.connect_timeout,
    ))));

    Arc::new(WarmupOrchestrator::new(
        Arc::new(catalog),
        Arc::new(PrefixWhitelist::new(config.whitelist.clone())),
        registry,
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
