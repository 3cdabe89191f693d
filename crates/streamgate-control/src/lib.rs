//! Session lifecycle control for streamgate gateway nodes.
//!
//! This crate holds the business logic between the HTTP/SSE surface and the
//! shared session store: creating and removing sessions, evicting idle ones,
//! asking peer nodes to release sessions they hold, and warming downstream
//! connections at startup.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP/SSE)                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SessionManager                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Local     │ │   Session   │ │    SessionReaper    │    │
//! │  │ connections │ │   store     │ │   (periodic sweep)  │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌────────────┐
//!        │  Store   │   │   Peer   │   │   Warmup   │
//!        │ (Rocks/  │   │  nodes   │   │ (catalog + │
//!        │  Redis)  │   │  (HTTP)  │   │ connector) │
//!        └──────────┘   └──────────┘   └────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamgate_control::{NoopPeerClient, SessionConfig, SessionManager};
//! use streamgate_core::NodeAddress;
//! use streamgate_store::{RocksStore, TransportKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/streamgate")?);
//! let manager = SessionManager::new(
//!     store,
//!     NodeAddress::new("127.0.0.1", 9091),
//!     Arc::new(NoopPeerClient::new()),
//!     SessionConfig::default(),
//! );
//!
//! let handle = manager.create_session(TransportKind::Sse, None).await?;
//! manager.touch(handle.session_id);
//! manager.remove_session(&handle.session_id).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Eviction
//!
//! Only SSE sessions are evicted. A session is removed by the reaper when its
//! `last_active_at` is strictly older than `now - timeout`. Streamable HTTP
//! sessions live until their client disconnects.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod connector;
pub mod error;
pub mod peer_client;
pub mod reaper;
pub mod session;
pub mod types;
pub mod warmup;

pub use catalog::{AdmissionPolicy, PrefixWhitelist, ServiceCatalog, StaticCatalog};
pub use connector::{Connector, ReferenceRegistry, ServiceReference, TcpConnector};
pub use error::{ControlError, Result};
pub use peer_client::{HttpPeerClient, NoopPeerClient, PeerClient, INTERNAL_SESSIONS_PATH};
pub use reaper::SessionReaper;
pub use session::{OutboundMessage, SessionHandle, SessionManager};
pub use types::{
    ApprovalState, EndpointInfo, ReaperConfig, ServiceDescriptor, SessionConfig, SweepReport,
    WarmupConfig, WarmupReport,
};
pub use warmup::{select_endpoint, WarmupOrchestrator};

// Re-export commonly used types from dependencies for convenience
pub use streamgate_core::{NodeAddress, SessionId};
pub use streamgate_store::{SessionRecord, SessionStore, TransportKind};
