//! Database schema definitions and column families.
//!
//! This module defines the column families used by the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary session records, keyed by `session_id`.
    pub const SESSIONS: &str = "sessions";

    /// Index: sessions by owning node, keyed by `owner || 0x00 || session_id`.
    pub const SESSIONS_BY_OWNER: &str = "sessions_by_owner";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::SESSIONS, cf::SESSIONS_BY_OWNER]
}
