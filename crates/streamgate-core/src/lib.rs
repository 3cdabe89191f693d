//! Core types and utilities for streamgate.
//!
//! This crate provides the foundational types shared by every streamgate crate:
//!
//! - **Identifiers**: [`SessionId`] for streaming sessions and [`NodeAddress`]
//!   for the gateway node that owns them
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use streamgate_core::{NodeAddress, SessionId};
//!
//! // Generate a session ID
//! let session_id = SessionId::generate();
//!
//! // Parse the address of a gateway node
//! let owner: NodeAddress = "10.0.0.7:9091".parse().unwrap();
//! assert_eq!(owner.port(), 9091);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;

pub use error::{CoreError, Result};
pub use ids::{IdError, NodeAddress, SessionId};
