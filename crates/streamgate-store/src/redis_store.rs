//! Redis storage implementation.
//!
//! Records are stored as string hashes so they stay readable from
//! `redis-cli`. Every write refreshes the TTL of the session hash and its
//! owner set, so a node that dies without cleaning up leaves no sessions
//! behind once the TTL elapses. The `{prefix}:instances` set has no expiry;
//! owners leave it when their last session is released.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::ConnectionManager;
use serde::Deserialize;
use streamgate_core::{NodeAddress, SessionId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::types::{SessionRecord, TransportKind};
use crate::SessionStore;

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 256;

/// Update one hash field only if the hash exists; returns the owner or nil.
const UPDATE_IF_EXISTS: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[3])
return redis.call('HGET', KEYS[1], 'owner')
";

/// Drop one session from an owner set, and the owner itself once the set is
/// empty; returns 1 if the owner was removed.
const RELEASE_OWNER: &str = r"
redis.call('SREM', KEYS[1], ARGV[1])
if redis.call('SCARD', KEYS[1]) == 0 then
    redis.call('DEL', KEYS[1])
    redis.call('SREM', KEYS[2], ARGV[2])
    return 1
end
return 0
";

mod field {
    pub const SESSION_ID: &str = "session_id";
    pub const TRANSPORT: &str = "transport";
    pub const OWNER: &str = "owner";
    pub const CREATED_AT: &str = "created_at";
    pub const LAST_ACTIVE_AT: &str = "last_active_at";
    pub const ENDPOINT: &str = "endpoint";
    pub const SERVICE_NAME: &str = "service_name";
}

/// Configuration for the Redis backend.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisStoreConfig {
    /// Connection URL.
    #[serde(default = "RedisStoreConfig::default_url")]
    pub url: String,

    /// Prefix for every key written by this store.
    #[serde(default = "RedisStoreConfig::default_key_prefix")]
    pub key_prefix: String,

    /// Expiry applied to every key on write.
    #[serde(default = "RedisStoreConfig::default_ttl", with = "secs")]
    pub ttl: Duration,
}

impl RedisStoreConfig {
    fn default_url() -> String {
        "redis://127.0.0.1:6379".to_string()
    }

    fn default_key_prefix() -> String {
        "streamgate".to_string()
    }

    const fn default_ttl() -> Duration {
        Duration::from_secs(30 * 60)
    }
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            key_prefix: Self::default_key_prefix(),
            ttl: Self::default_ttl(),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Redis-backed storage implementation.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    config: RedisStoreConfig,
    update_script: redis::Script,
    release_script: redis::Script,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(config: RedisStoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!(url = %config.url, prefix = %config.key_prefix, "Connected to Redis session store");

        Ok(Self {
            conn,
            config,
            update_script: redis::Script::new(UPDATE_IF_EXISTS),
            release_script: redis::Script::new(RELEASE_OWNER),
        })
    }

    fn ttl_secs(&self) -> u64 {
        self.config.ttl.as_secs().max(1)
    }

    fn prefix(&self) -> &str {
        &self.config.key_prefix
    }

    async fn load(&self, key: &str) -> Result<Option<SessionRecord>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        decode_fields(&fields).map(Some)
    }

    async fn update_field(&self, session_id: &SessionId, name: &str, value: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let key = keys::redis_session_key(self.prefix(), session_id);
        let ttl = self.ttl_secs();

        let owner: Option<String> = self
            .update_script
            .key(&key)
            .arg(name)
            .arg(value)
            .arg(ttl)
            .invoke_async(&mut conn)
            .await?;

        let Some(owner) = owner else {
            return Ok(false);
        };

        if let Ok(owner) = owner.parse::<NodeAddress>() {
            redis::cmd("EXPIRE")
                .arg(keys::redis_owner_key(self.prefix(), &owner))
                .arg(ttl)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        Ok(true)
    }

    /// Remove `session_id` from the owner's set, and drop the owner entirely
    /// once it holds no sessions.
    async fn release_owner(&self, owner: &NodeAddress, session_id: &SessionId) -> Result<()> {
        let mut conn = self.conn.clone();

        let removed: u8 = self
            .release_script
            .key(keys::redis_owner_key(self.prefix(), owner))
            .key(keys::redis_owners_key(self.prefix()))
            .arg(session_id.to_string())
            .arg(owner.to_string())
            .invoke_async(&mut conn)
            .await?;

        if removed == 1 {
            tracing::debug!(owner = %owner, "Removed empty owner set");
        }

        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn put(&self, record: &SessionRecord) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = keys::redis_session_key(self.prefix(), &record.session_id);
        let owner_key = keys::redis_owner_key(self.prefix(), &record.owner);
        let owners_key = keys::redis_owners_key(self.prefix());
        let ttl = self.ttl_secs();

        let previous_owner: Option<String> = redis::cmd("HGET")
            .arg(&key)
            .arg(field::OWNER)
            .query_async(&mut conn)
            .await?;

        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(&key)
            .ignore()
            .cmd("HSET")
            .arg(&key)
            .arg(encode_fields(record))
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl)
            .ignore()
            .cmd("SADD")
            .arg(&owner_key)
            .arg(record.session_id.to_string())
            .ignore()
            .cmd("EXPIRE")
            .arg(&owner_key)
            .arg(ttl)
            .ignore()
            .cmd("SADD")
            .arg(&owners_key)
            .arg(record.owner.to_string())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        if let Some(old) = previous_owner.and_then(|o| o.parse::<NodeAddress>().ok()) {
            if old != record.owner {
                self.release_owner(&old, &record.session_id).await?;
            }
        }

        Ok(())
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        self.load(&keys::redis_session_key(self.prefix(), session_id))
            .await
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool> {
        let mut conn = self.conn.clone();
        let key = keys::redis_session_key(self.prefix(), session_id);

        let owner: Option<String> = redis::cmd("HGET")
            .arg(&key)
            .arg(field::OWNER)
            .query_async(&mut conn)
            .await?;
        let removed: u64 = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;

        match owner.as_deref().map(str::parse::<NodeAddress>) {
            Some(Ok(owner)) => self.release_owner(&owner, session_id).await?,
            Some(Err(e)) => {
                tracing::warn!(session_id = %session_id, error = %e, "Deleted session had an unparseable owner");
            }
            None => {}
        }

        Ok(removed > 0)
    }

    async fn list_all(&self) -> Result<Vec<SessionRecord>> {
        let mut conn = self.conn.clone();
        let pattern = keys::redis_session_pattern(self.prefix());

        let mut found = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        let mut records = Vec::with_capacity(found.len());
        for key in found {
            match self.load(&key).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(StoreError::Malformed(reason)) => {
                    tracing::warn!(key = %key, reason = %reason, "Skipping malformed session record");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(records)
    }

    async fn touch(&self, session_id: &SessionId, at: DateTime<Utc>) -> Result<bool> {
        self.update_field(session_id, field::LAST_ACTIVE_AT, &format_ts(at))
            .await
    }

    async fn set_service(&self, session_id: &SessionId, service_name: &str) -> Result<bool> {
        self.update_field(session_id, field::SERVICE_NAME, service_name)
            .await
    }

    async fn list_by_owner(&self, owner: &NodeAddress) -> Result<Vec<SessionRecord>> {
        let mut conn = self.conn.clone();
        let owner_key = keys::redis_owner_key(self.prefix(), owner);

        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&owner_key)
            .query_async(&mut conn)
            .await?;

        let mut records = Vec::with_capacity(members.len());
        for member in members {
            let Ok(session_id) = member.parse::<SessionId>() else {
                tracing::warn!(owner = %owner, member = %member, "Ignoring invalid session id in owner set");
                continue;
            };
            match self.get(&session_id).await? {
                Some(record) if record.owner == *owner => records.push(record),
                Some(_) => {}
                None => {
                    // Hash expired but the set entry outlived it.
                    redis::cmd("SREM")
                        .arg(&owner_key)
                        .arg(&member)
                        .query_async::<_, ()>(&mut conn)
                        .await?;
                }
            }
        }

        Ok(records)
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Malformed(format!("{name}: {e}")))
}

/// Flatten a record into hash fields. Absent optional fields are omitted.
#[must_use]
pub fn encode_fields(record: &SessionRecord) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        (field::SESSION_ID, record.session_id.to_string()),
        (field::TRANSPORT, record.transport.to_string()),
        (field::OWNER, record.owner.to_string()),
        (field::CREATED_AT, format_ts(record.created_at)),
        (field::LAST_ACTIVE_AT, format_ts(record.last_active_at)),
    ];
    if let Some(endpoint) = &record.endpoint {
        fields.push((field::ENDPOINT, endpoint.clone()));
    }
    if let Some(service) = &record.service_name {
        fields.push((field::SERVICE_NAME, service.clone()));
    }
    fields
}

/// Rebuild a record from hash fields.
///
/// # Errors
///
/// Returns `StoreError::Malformed` if a required field is missing or invalid.
pub fn decode_fields(fields: &HashMap<String, String>) -> Result<SessionRecord> {
    let required = |name: &str| {
        fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| StoreError::Malformed(format!("missing field {name}")))
    };
    let optional = |name: &str| fields.get(name).filter(|v| !v.is_empty()).cloned();

    let session_id = required(field::SESSION_ID)?
        .parse::<SessionId>()
        .map_err(|e| StoreError::Malformed(format!("{}: {e}", field::SESSION_ID)))?;
    let transport = required(field::TRANSPORT)?
        .parse::<TransportKind>()
        .map_err(|e| StoreError::Malformed(e.to_string()))?;
    let owner = required(field::OWNER)?
        .parse::<NodeAddress>()
        .map_err(|e| StoreError::Malformed(format!("{}: {e}", field::OWNER)))?;
    let created_at = parse_ts(field::CREATED_AT, required(field::CREATED_AT)?)?;
    let last_active_at = parse_ts(field::LAST_ACTIVE_AT, required(field::LAST_ACTIVE_AT)?)?;

    Ok(SessionRecord {
        session_id,
        transport,
        owner,
        created_at,
        last_active_at,
        endpoint: optional(field::ENDPOINT),
        service_name: optional(field::SERVICE_NAME),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_map(fields: Vec<(&'static str, String)>) -> HashMap<String, String> {
        fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn sample() -> SessionRecord {
        let now = DateTime::parse_from_rfc3339("2026-03-01T12:00:00.250Z")
            .unwrap()
            .with_timezone(&Utc);
        SessionRecord::new(
            SessionId::generate(),
            TransportKind::Sse,
            NodeAddress::new("10.0.0.5", 9091),
            now,
        )
    }

    #[test]
    fn encoded_fields_are_plain_strings() {
        let record = sample().with_endpoint(Some("orders".to_string()));
        let map = as_map(encode_fields(&record));

        assert_eq!(map["transport"], "SSE");
        assert_eq!(map["owner"], "10.0.0.5:9091");
        assert_eq!(map["last_active_at"], "2026-03-01T12:00:00.250Z");
        assert_eq!(map["endpoint"], "orders");
        assert!(!map.contains_key("service_name"));

        assert_eq!(decode_fields(&map).unwrap(), record);
    }

    #[test]
    fn decode_accepts_lowercase_transport() {
        let record = sample();
        let mut map = as_map(encode_fields(&record));
        map.insert("transport".to_string(), "sse".to_string());

        assert_eq!(decode_fields(&map).unwrap().transport, TransportKind::Sse);
    }

    #[test]
    fn decode_rejects_unknown_transport() {
        let mut map = as_map(encode_fields(&sample()));
        map.insert("transport".to_string(), "carrier-pigeon".to_string());

        assert!(matches!(decode_fields(&map), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn decode_rejects_missing_owner() {
        let mut map = as_map(encode_fields(&sample()));
        map.remove("owner");

        let err = decode_fields(&map).unwrap_err();
        assert!(err.to_string().contains("owner"));
    }

    #[test]
    fn empty_optional_field_is_none() {
        let mut map = as_map(encode_fields(&sample()));
        map.insert("service_name".to_string(), String::new());

        assert!(decode_fields(&map).unwrap().service_name.is_none());
    }

    #[test]
    fn config_defaults() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.key_prefix, "streamgate");
        assert_eq!(config.ttl, Duration::from_secs(1800));
    }
}
