//! Cluster-visible session store for streamgate.
//!
//! This crate holds one [`SessionRecord`] per live streaming session,
//! independent of any single gateway node's memory. Two backends implement
//! [`SessionStore`]:
//!
//! - [`RocksStore`]: embedded `RocksDB`, for a single host or development.
//! - [`RedisStore`]: shared Redis, for a multi-node cluster.
//!
//! # Architecture
//!
//! The `RocksDB` backend uses the following column families:
//!
//! - `sessions`: Primary session records, keyed by `session_id`
//! - `sessions_by_owner`: Index for listing sessions by owning node
//!
//! The Redis backend uses a three-layer key layout. Session hashes and owner
//! sets carry a TTL refreshed on every write; the instances set does not:
//!
//! ```text
//! {prefix}:instances            SET  of owner addresses
//! {prefix}:instance:{owner}     SET  of session ids held by that owner
//! {prefix}:sessions:{id}        HASH with the record fields
//! ```
//!
//! # Example
//!
//! ```no_run
//! use streamgate_store::{RocksStore, SessionRecord, SessionStore, TransportKind};
//! use streamgate_core::{NodeAddress, SessionId};
//!
//! # async fn example() -> streamgate_store::Result<()> {
//! let store = RocksStore::open("/tmp/streamgate-db")?;
//!
//! let owner = NodeAddress::new("10.0.0.7", 9091);
//! let record = SessionRecord::new(SessionId::generate(), TransportKind::Sse, owner.clone(), chrono::Utc::now());
//! store.put(&record).await?;
//!
//! let mine = store.list_by_owner(&owner).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod redis_store;
pub mod rocks;
pub mod schema;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use error::{Result, StoreError};
pub use redis_store::{RedisStore, RedisStoreConfig};
pub use rocks::RocksStore;
pub use types::{SessionRecord, TransportKind, UnknownTransport};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use streamgate_core::{NodeAddress, SessionId};

/// The shared session registry.
///
/// All mutations are idempotent: deleting a missing record succeeds with
/// `false`, and partial updates of a missing record never create it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn put(&self, record: &SessionRecord) -> Result<()>;

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails or the record is malformed.
    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Delete a session by ID.
    ///
    /// Returns whether a record was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn delete(&self, session_id: &SessionId) -> Result<bool>;

    /// List every session in the store.
    ///
    /// Records that cannot be decoded are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn list_all(&self) -> Result<Vec<SessionRecord>>;

    /// Set `last_active_at` on an existing record.
    ///
    /// Returns `false` without writing anything if the record does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn touch(&self, session_id: &SessionId, at: DateTime<Utc>) -> Result<bool>;

    /// Record the downstream service bound to an existing session.
    ///
    /// Returns `false` without writing anything if the record does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn set_service(&self, session_id: &SessionId, service_name: &str) -> Result<bool>;

    /// List the sessions owned by a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn list_by_owner(&self, owner: &NodeAddress) -> Result<Vec<SessionRecord>>;
}
