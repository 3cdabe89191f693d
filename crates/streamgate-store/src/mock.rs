//! In-memory session store for testing without `RocksDB` or Redis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use streamgate_core::{NodeAddress, SessionId};

use crate::error::{Result, StoreError};
use crate::types::SessionRecord;
use crate::SessionStore;

/// A mock store that keeps records in a map and can be told to fail.
#[derive(Default)]
pub struct MockSessionStore {
    records: Mutex<HashMap<SessionId, SessionRecord>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    failing_deletes: Mutex<Vec<SessionId>>,
}

impl MockSessionStore {
    /// Create a new empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `put`, `touch`, `set_service` and `delete` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `get`, `list_all` and `list_by_owner` fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `delete` fail for one specific session.
    pub fn fail_delete_of(&self, session_id: SessionId) {
        self.failing_deletes.lock().push(session_id);
    }

    /// Insert a record directly, bypassing failure injection.
    pub fn insert(&self, record: SessionRecord) {
        self.records.lock().insert(record.session_id, record);
    }

    /// Whether a record exists.
    #[must_use]
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.records.lock().contains_key(session_id)
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected write failure".to_string()));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MockSessionStore {
    async fn put(&self, record: &SessionRecord) -> Result<()> {
        self.check_write()?;
        self.insert(record.clone());
        Ok(())
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        self.check_read()?;
        Ok(self.records.lock().get(session_id).cloned())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool> {
        self.check_write()?;
        if self.failing_deletes.lock().contains(session_id) {
            return Err(StoreError::Database("injected delete failure".to_string()));
        }
        Ok(self.records.lock().remove(session_id).is_some())
    }

    async fn list_all(&self) -> Result<Vec<SessionRecord>> {
        self.check_read()?;
        Ok(self.records.lock().values().cloned().collect())
    }

    async fn touch(&self, session_id: &SessionId, at: DateTime<Utc>) -> Result<bool> {
        self.check_write()?;
        Ok(self
            .records
            .lock()
            .get_mut(session_id)
            .map(|r| r.last_active_at = at)
            .is_some())
    }

    async fn set_service(&self, session_id: &SessionId, service_name: &str) -> Result<bool> {
        self.check_write()?;
        Ok(self
            .records
            .lock()
            .get_mut(session_id)
            .map(|r| r.service_name = Some(service_name.to_string()))
            .is_some())
    }

    async fn list_by_owner(&self, owner: &NodeAddress) -> Result<Vec<SessionRecord>> {
        self.check_read()?;
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| r.owner == *owner)
            .cloned()
            .collect())
    }
}
