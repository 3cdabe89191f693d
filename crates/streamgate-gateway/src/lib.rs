//! HTTP and SSE gateway node for streamgate.
//!
//! This crate is the outward face of a gateway node. It handles:
//!
//! - SSE session streams and inbound message activity
//! - REST endpoints for inspecting and removing sessions cluster-wide
//! - Internal endpoints peers use to release sessions held here
//! - Startup wiring: store, membership, reaper and warmup
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Clients                            │
//! │                       (HTTP / SSE)                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    streamgate-gateway                       │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │    SSE      │ │   Router    │ │     Internal        │    │
//! │  │  streams    │ │  + Handlers │ │  (peer release)     │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │ Session  │   │  Node    │   │  Peer    │
//!        │ Manager  │   │Directory │   │  nodes   │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamgate_cluster::{ClusterConfig, NodeDirectory, StaticMembership};
//! use streamgate_control::{NoopPeerClient, SessionConfig, SessionManager};
//! use streamgate_core::NodeAddress;
//! use streamgate_gateway::{create_router, GatewayConfig, GatewayState};
//! use streamgate_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let local = NodeAddress::new("127.0.0.1", 9091);
//! let store = Arc::new(RocksStore::open("/tmp/streamgate")?);
//! let manager = Arc::new(SessionManager::new(
//!     store,
//!     local.clone(),
//!     Arc::new(NoopPeerClient::new()),
//!     SessionConfig::default(),
//! ));
//! let directory = Arc::new(NodeDirectory::new(
//!     Arc::new(StaticMembership),
//!     ClusterConfig::default(),
//!     local,
//! ));
//!
//! let state = GatewayState::new(manager, directory, GatewayConfig::default());
//! state.mark_ready();
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:9091").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{ConfigError, GatewayConfig, StoreBackend};
pub use error::ApiError;
pub use routes::create_router;
pub use server::serve;
pub use state::GatewayState;
