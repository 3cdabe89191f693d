//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `SessionStore` trait.
//! Read-modify-write operations (`touch`, `set_service`, `delete`) are
//! serialized through a process-local lock so a refresh can never resurrect a
//! concurrently deleted record.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};
use streamgate_core::{NodeAddress, SessionId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::SessionRecord;
use crate::SessionStore;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        let cf = self.cf(cf::SESSIONS)?;
        let key = keys::session_key(session_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Write the record and its owner index, dropping a stale index entry if
    /// the owner changed.
    fn write(&self, record: &SessionRecord, previous_owner: Option<&NodeAddress>) -> Result<()> {
        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_owner = self.cf(cf::SESSIONS_BY_OWNER)?;

        let session_key = keys::session_key(&record.session_id);
        let owner_key = keys::owner_session_key(&record.owner, &record.session_id);
        let value = Self::serialize(record)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_sessions, &session_key, &value);
        if let Some(old) = previous_owner.filter(|old| **old != record.owner) {
            batch.delete_cf(&cf_by_owner, keys::owner_session_key(old, &record.session_id));
        }
        batch.put_cf(&cf_by_owner, &owner_key, []);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Apply `update` to an existing record. Returns `false` if it is absent.
    fn modify(&self, session_id: &SessionId, update: impl FnOnce(&mut SessionRecord)) -> Result<bool> {
        let _guard = self.write_lock.lock();

        let Some(mut record) = self.read(session_id)? else {
            return Ok(false);
        };
        let owner = record.owner.clone();
        update(&mut record);
        self.write(&record, Some(&owner))?;
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for RocksStore {
    async fn put(&self, record: &SessionRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        let previous = self.read(&record.session_id)?.map(|r| r.owner);
        self.write(record, previous.as_ref())
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        self.read(session_id)
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool> {
        let _guard = self.write_lock.lock();

        let Some(record) = self.read(session_id)? else {
            return Ok(false);
        };

        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_owner = self.cf(cf::SESSIONS_BY_OWNER)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_sessions, keys::session_key(session_id));
        batch.delete_cf(&cf_by_owner, keys::owner_session_key(&record.owner, session_id));

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(true)
    }

    async fn list_all(&self) -> Result<Vec<SessionRecord>> {
        let cf = self.cf(cf::SESSIONS)?;

        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            match Self::deserialize::<SessionRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(key_len = key.len(), error = %e, "Skipping undecodable session record");
                }
            }
        }

        Ok(records)
    }

    async fn touch(&self, session_id: &SessionId, at: DateTime<Utc>) -> Result<bool> {
        self.modify(session_id, |record| record.last_active_at = at)
    }

    async fn set_service(&self, session_id: &SessionId, service_name: &str) -> Result<bool> {
        self.modify(session_id, |record| {
            record.service_name = Some(service_name.to_string());
        })
    }

    async fn list_by_owner(&self, owner: &NodeAddress) -> Result<Vec<SessionRecord>> {
        let cf_by_owner = self.cf(cf::SESSIONS_BY_OWNER)?;
        let prefix = keys::owner_prefix(owner);

        let mut records = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_by_owner,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let Some(session_id) = keys::extract_session_id_from_owner_key(&key) else {
                continue;
            };
            if let Some(record) = self.read(&session_id)? {
                records.push(record);
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransportKind;
    use chrono::Duration;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn node(port: u16) -> NodeAddress {
        NodeAddress::new("10.0.0.1", port)
    }

    fn create_test_record(owner: &NodeAddress) -> SessionRecord {
        SessionRecord::new(
            SessionId::generate(),
            TransportKind::Sse,
            owner.clone(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn session_crud() {
        let (store, _dir) = create_test_store();
        let record = create_test_record(&node(9091));

        // Create
        store.put(&record).await.unwrap();

        // Read
        let retrieved = store.get(&record.session_id).await.unwrap().unwrap();
        assert_eq!(retrieved, record);

        // Touch
        let later = record.last_active_at + Duration::seconds(30);
        assert!(store.touch(&record.session_id, later).await.unwrap());
        let touched = store.get(&record.session_id).await.unwrap().unwrap();
        assert_eq!(touched.last_active_at, later);
        assert_eq!(touched.created_at, record.created_at);

        // Delete
        assert!(store.delete(&record.session_id).await.unwrap());
        assert!(store.get(&record.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (store, _dir) = create_test_store();
        let record = create_test_record(&node(9091));
        store.put(&record).await.unwrap();

        assert!(store.delete(&record.session_id).await.unwrap());
        assert!(!store.delete(&record.session_id).await.unwrap());
        assert!(!store.delete(&SessionId::generate()).await.unwrap());
    }

    #[tokio::test]
    async fn touch_does_not_resurrect() {
        let (store, _dir) = create_test_store();
        let record = create_test_record(&node(9091));
        store.put(&record).await.unwrap();
        store.delete(&record.session_id).await.unwrap();

        assert!(!store.touch(&record.session_id, Utc::now()).await.unwrap());
        assert!(!store.set_service(&record.session_id, "svc").await.unwrap());
        assert!(store.get(&record.session_id).await.unwrap().is_none());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_service_binds_name() {
        let (store, _dir) = create_test_store();
        let record = create_test_record(&node(9091));
        store.put(&record).await.unwrap();

        assert!(store
            .set_service(&record.session_id, "com.acme.OrderService")
            .await
            .unwrap());
        let bound = store.get(&record.session_id).await.unwrap().unwrap();
        assert_eq!(bound.service_name.as_deref(), Some("com.acme.OrderService"));
    }

    #[tokio::test]
    async fn list_by_owner() {
        let (store, _dir) = create_test_store();
        let a = node(9091);
        let b = node(9092);

        // Create sessions for a
        for _ in 0..3 {
            store.put(&create_test_record(&a)).await.unwrap();
        }
        // Create session for b
        let on_b = create_test_record(&b);
        store.put(&on_b).await.unwrap();

        assert_eq!(store.list_by_owner(&a).await.unwrap().len(), 3);
        let b_sessions = store.list_by_owner(&b).await.unwrap();
        assert_eq!(b_sessions, vec![on_b]);
        assert_eq!(store.list_all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn owner_index_follows_reassignment() {
        let (store, _dir) = create_test_store();
        let a = node(9091);
        let b = node(9092);

        let mut record = create_test_record(&a);
        store.put(&record).await.unwrap();

        record.owner = b.clone();
        store.put(&record).await.unwrap();

        assert!(store.list_by_owner(&a).await.unwrap().is_empty());
        assert_eq!(store.list_by_owner(&b).await.unwrap().len(), 1);

        store.delete(&record.session_id).await.unwrap();
        assert!(store.list_by_owner(&b).await.unwrap().is_empty());
    }
}
