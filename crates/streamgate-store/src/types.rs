//! Domain types stored in the session store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use streamgate_core::{NodeAddress, SessionId};

/// Streaming transport a session was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TransportKind {
    /// Server-sent events. Subject to inactivity eviction.
    Sse,
    /// Streamable HTTP. Never evicted by the reaper.
    StreamableHttp,
}

impl TransportKind {
    /// Canonical wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sse => "SSE",
            Self::StreamableHttp => "STREAMABLE_HTTP",
        }
    }

    /// Whether sessions of this kind are removed after a period of silence.
    #[must_use]
    pub const fn is_evictable(self) -> bool {
        matches!(self, Self::Sse)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a transport name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transport kind: {0:?}")]
pub struct UnknownTransport(pub String);

impl FromStr for TransportKind {
    type Err = UnknownTransport;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "SSE" => Ok(Self::Sse),
            "STREAMABLE_HTTP" | "STREAMABLEHTTP" => Ok(Self::StreamableHttp),
            _ => Err(UnknownTransport(s.to_string())),
        }
    }
}

impl TryFrom<String> for TransportKind {
    type Error = UnknownTransport;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TransportKind> for String {
    fn from(kind: TransportKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A session record stored in the shared registry.
///
/// Exactly one record exists per live session; `owner` names the node holding
/// the transport resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique identifier for the session.
    pub session_id: SessionId,
    /// Transport the client connected with.
    pub transport: TransportKind,
    /// Node holding the live connection.
    pub owner: NodeAddress,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last inbound activity. Sole input to timeout decisions.
    pub last_active_at: DateTime<Utc>,
    /// Logical endpoint the client connected to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Downstream service bound to the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl SessionRecord {
    /// Create a fresh record with `created_at == last_active_at == now`.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        transport: TransportKind,
        owner: NodeAddress,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            transport,
            owner,
            created_at: now,
            last_active_at: now,
            endpoint: None,
            service_name: None,
        }
    }

    /// Set the logical endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// True if the record is evictable and was last active strictly before `threshold`.
    #[must_use]
    pub fn is_expired(&self, threshold: DateTime<Utc>) -> bool {
        self.transport.is_evictable() && self.last_active_at < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(kind: TransportKind, last_active: DateTime<Utc>) -> SessionRecord {
        let mut r = SessionRecord::new(
            SessionId::generate(),
            kind,
            NodeAddress::new("10.0.0.1", 9091),
            last_active,
        );
        r.last_active_at = last_active;
        r
    }

    #[test]
    fn transport_parse_is_case_insensitive() {
        assert_eq!("sse".parse::<TransportKind>().unwrap(), TransportKind::Sse);
        assert_eq!("SsE".parse::<TransportKind>().unwrap(), TransportKind::Sse);
        assert_eq!(
            "streamable-http".parse::<TransportKind>().unwrap(),
            TransportKind::StreamableHttp
        );
        assert_eq!(
            "STREAMABLE_HTTP".parse::<TransportKind>().unwrap(),
            TransportKind::StreamableHttp
        );
    }

    #[test]
    fn unknown_transport_rejected() {
        let err = "websocket".parse::<TransportKind>().unwrap_err();
        assert_eq!(err, UnknownTransport("websocket".to_string()));
    }

    #[test]
    fn only_sse_expires() {
        let now = Utc::now();
        let threshold = now - Duration::seconds(600);

        let old_sse = record(TransportKind::Sse, now - Duration::seconds(700));
        let old_http = record(TransportKind::StreamableHttp, now - Duration::seconds(700));
        let fresh_sse = record(TransportKind::Sse, now - Duration::seconds(100));

        assert!(old_sse.is_expired(threshold));
        assert!(!old_http.is_expired(threshold));
        assert!(!fresh_sse.is_expired(threshold));
    }

    #[test]
    fn boundary_is_not_expired() {
        let threshold = Utc::now();
        let at_threshold = record(TransportKind::Sse, threshold);
        assert!(!at_threshold.is_expired(threshold));
    }

    #[test]
    fn cbor_keeps_optional_fields() {
        let mut r = record(TransportKind::StreamableHttp, Utc::now())
            .with_endpoint(Some("orders".to_string()));
        r.service_name = Some("com.acme.OrderService".to_string());

        let mut buf = Vec::new();
        ciborium::into_writer(&r, &mut buf).unwrap();
        let back: SessionRecord = ciborium::from_reader(buf.as_slice()).unwrap();

        assert_eq!(back, r);
        assert_eq!(back.endpoint.as_deref(), Some("orders"));
    }
}
