//! Cluster membership and node directory for streamgate.
//!
//! This crate answers one question for the rest of the gateway: which
//! gateway nodes are alive right now. It provides the [`MembershipClient`]
//! trait with three backends and the [`NodeDirectory`] built on top of it.
//! [`SelfRegistration`] announces the local node to registries that need it.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       NodeDirectory                        │
//! │   list_active_nodes()  ──►  filter healthy && enabled      │
//! │                        └─►  fall back to [self]            │
//! └────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                    dyn MembershipClient
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │    Nacos     │   │  Kubernetes  │   │    Static    │
//!  │  HTTP API    │   │   pod list   │   │  (no peers)  │
//!  └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamgate_cluster::{connect_membership, ClusterConfig, NodeDirectory};
//! use streamgate_core::NodeAddress;
//!
//! # async fn example() -> streamgate_cluster::Result<()> {
//! let config = ClusterConfig::from_env()?;
//! let membership = connect_membership(&config).await?;
//! let directory = NodeDirectory::new(membership, config, NodeAddress::new("10.0.0.7", 9091));
//!
//! for node in directory.list_active_nodes().await {
//!     println!("{}", node.address);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! For testing without a registry, enable the `test-utils` feature and use
//! [`MockMembership`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod directory;
pub mod error;
pub mod k8s;
pub mod membership;
pub mod nacos;
pub mod registration;
pub mod types;

use std::sync::Arc;

pub use directory::NodeDirectory;
pub use error::{ClusterError, Result};
pub use k8s::K8sMembership;
pub use membership::{MembershipClient, StaticMembership};
pub use nacos::NacosMembership;
pub use registration::SelfRegistration;
pub use types::{
    detect_local_host, ClusterConfig, ClusterNode, MemberInstance, MembershipBackend,
};

#[cfg(any(test, feature = "test-utils"))]
pub use membership::mock::{MockMembership, RegistrationCall};

/// Build the membership client selected by `config.backend`.
///
/// # Errors
///
/// Returns an error if the backend client cannot be created.
pub async fn connect_membership(config: &ClusterConfig) -> Result<Arc<dyn MembershipClient>> {
    let client: Arc<dyn MembershipClient> = match config.backend {
        MembershipBackend::Static => Arc::new(StaticMembership),
        MembershipBackend::Nacos => Arc::new(NacosMembership::new(
            config.nacos_url.clone(),
            config.request_timeout,
        )?),
        MembershipBackend::Kubernetes => Arc::new(K8sMembership::new(config.peer_port).await?),
    };

    tracing::info!(
        backend = client.backend_name(),
        service_name = %config.service_name,
        group = %config.group,
        "Cluster membership configured"
    );

    Ok(client)
}
