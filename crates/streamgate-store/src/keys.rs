//! Key encoding utilities.
//!
//! `RocksDB` keys are designed to support efficient prefix scans. Redis keys
//! follow the three-layer layout `{prefix}:instances` →
//! `{prefix}:instance:{owner}` → `{prefix}:sessions:{id}`.

use streamgate_core::{NodeAddress, SessionId};

/// Separator between the owner and the session id in index keys.
///
/// Node addresses never contain a NUL byte, so the owner prefix is unambiguous.
const OWNER_SEPARATOR: u8 = 0x00;

/// Encode a session key (just the session ID bytes).
#[must_use]
pub fn session_key(session_id: &SessionId) -> Vec<u8> {
    session_id.as_bytes().to_vec()
}

/// Encode an owner-session index key: `owner || 0x00 || session_id`.
#[must_use]
pub fn owner_session_key(owner: &NodeAddress, session_id: &SessionId) -> Vec<u8> {
    let mut key = owner_prefix(owner);
    key.extend_from_slice(session_id.as_bytes());
    key
}

/// Encode an owner prefix for scanning all sessions held by a node.
#[must_use]
pub fn owner_prefix(owner: &NodeAddress) -> Vec<u8> {
    let owner = owner.to_string();
    let mut key = Vec::with_capacity(owner.len() + 17);
    key.extend_from_slice(owner.as_bytes());
    key.push(OWNER_SEPARATOR);
    key
}

/// Extract the session ID from an owner-session key.
///
/// Returns `None` if the key is too short to contain one.
#[must_use]
pub fn extract_session_id_from_owner_key(key: &[u8]) -> Option<SessionId> {
    let start = key.len().checked_sub(16)?;
    let bytes: [u8; 16] = key[start..].try_into().ok()?;
    Some(SessionId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

/// Redis hash holding one session record.
#[must_use]
pub fn redis_session_key(prefix: &str, session_id: &SessionId) -> String {
    format!("{prefix}:sessions:{session_id}")
}

/// Redis pattern matching every session hash.
#[must_use]
pub fn redis_session_pattern(prefix: &str) -> String {
    format!("{prefix}:sessions:*")
}

/// Redis set of session ids held by one node.
#[must_use]
pub fn redis_owner_key(prefix: &str, owner: &NodeAddress) -> String {
    format!("{prefix}:instance:{owner}")
}

/// Redis set of every node that currently owns sessions.
#[must_use]
pub fn redis_owners_key(prefix: &str) -> String {
    format!("{prefix}:instances")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_session_key_roundtrip() {
        let owner = NodeAddress::new("10.0.0.1", 9091);
        let session_id = SessionId::generate();

        let key = owner_session_key(&owner, &session_id);
        assert_eq!(key.len(), "10.0.0.1:9091".len() + 1 + 16);

        let extracted = extract_session_id_from_owner_key(&key).unwrap();
        assert_eq!(extracted, session_id);
    }

    #[test]
    fn owner_prefix_does_not_match_longer_port() {
        let short = NodeAddress::new("10.0.0.1", 909);
        let long = NodeAddress::new("10.0.0.1", 9091);

        let key = owner_session_key(&long, &SessionId::generate());
        assert!(key.starts_with(&owner_prefix(&long)));
        assert!(!key.starts_with(&owner_prefix(&short)));
    }

    #[test]
    fn short_key_yields_none() {
        assert!(extract_session_id_from_owner_key(&[1, 2, 3]).is_none());
    }

    #[test]
    fn redis_key_layout() {
        let id: SessionId = "6f1c2a9e-8d55-4b8e-9c4a-0f2b7d1e3a44".parse().unwrap();
        let owner = NodeAddress::new("10.0.0.1", 9091);

        assert_eq!(
            redis_session_key("sg", &id),
            "sg:sessions:6f1c2a9e-8d55-4b8e-9c4a-0f2b7d1e3a44"
        );
        assert_eq!(redis_owner_key("sg", &owner), "sg:instance:10.0.0.1:9091");
        assert_eq!(redis_owners_key("sg"), "sg:instances");
        assert_eq!(redis_session_pattern("sg"), "sg:sessions:*");
    }
}
