//! Error types for the control layer.
//!
//! This module defines all errors that can occur during session lifecycle
//! management, peer dispatch and warmup.

use std::time::Duration;

use streamgate_core::{NodeAddress, SessionId};
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] streamgate_store::StoreError),

    /// A store call did not finish in time.
    #[error("store operation timed out after {0:?}")]
    StoreTimeout(Duration),

    /// A peer node could not be asked to release a session.
    #[error("peer {owner} rejected close: {reason}")]
    Peer {
        /// The node that owns the session.
        owner: NodeAddress,
        /// What went wrong.
        reason: String,
    },

    /// The approved-service catalog could not be read.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// A service has no endpoints to connect to.
    #[error("no endpoints available for {0}")]
    NoEndpoints(String),

    /// A downstream connection could not be established.
    #[error("failed to connect {interface_name} at {address}: {reason}")]
    Connect {
        /// Interface being warmed.
        interface_name: String,
        /// Endpoint address.
        address: String,
        /// What went wrong.
        reason: String,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::SessionNotFound(_) => 404,
            Self::StoreTimeout(_) | Self::Peer { .. } | Self::Connect { .. } => 503,
            Self::NoEndpoints(_) => 409,
            Self::Store(_) | Self::Catalog(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retriable(),
            Self::StoreTimeout(_) | Self::Peer { .. } | Self::Connect { .. } => true,
            Self::SessionNotFound(_)
            | Self::NoEndpoints(_)
            | Self::Catalog(_)
            | Self::Internal(_) => false,
        }
    }
}
