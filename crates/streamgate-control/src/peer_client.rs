//! HTTP client for asking a peer node to release a session it owns.
//!
//! When a node deletes a session record whose live connection sits on another
//! node, it calls `DELETE http://{owner}/internal/v1/sessions/{id}` on the
//! owner so the owner drops the stream too.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use streamgate_core::{NodeAddress, SessionId};

use crate::error::{ControlError, Result};

/// Path prefix of the owner-side close endpoint.
pub const INTERNAL_SESSIONS_PATH: &str = "/internal/v1/sessions";

/// Trait for peer communication.
///
/// This trait abstracts the peer client interface, allowing for mock
/// implementations in tests.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Ask `owner` to release its local resource for `session_id`.
    ///
    /// A peer that no longer knows the session counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails or the peer rejects it.
    async fn close_session(&self, owner: &NodeAddress, session_id: &SessionId) -> Result<()>;
}

/// HTTP client for peer gateway nodes.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
}

/// Error envelope returned by gateway nodes.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpPeerClient {
    /// Create a new peer client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ControlError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Create a new peer client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn close_url(owner: &NodeAddress, session_id: &SessionId) -> String {
        format!("http://{owner}{INTERNAL_SESSIONS_PATH}/{session_id}")
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn close_session(&self, owner: &NodeAddress, session_id: &SessionId) -> Result<()> {
        let url = Self::close_url(owner, session_id);

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| ControlError::Peer {
                owner: owner.clone(),
                reason: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(session_id = %session_id, owner = %owner, status = %status, "Peer released session");
            return Ok(());
        }

        let reason = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("peer returned status {status}"));

        Err(ControlError::Peer {
            owner: owner.clone(),
            reason,
        })
    }
}

/// A no-op peer client for single-node deployments.
#[derive(Debug, Clone, Default)]
pub struct NoopPeerClient;

impl NoopPeerClient {
    /// Create a new no-op peer client.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerClient for NoopPeerClient {
    async fn close_session(&self, owner: &NodeAddress, session_id: &SessionId) -> Result<()> {
        tracing::debug!(
            session_id = %session_id,
            owner = %owner,
            "NoopPeerClient: close_session called but peer dispatch is disabled"
        );
        Ok(())
    }
}

/// A peer client that records calls, for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Records every close request and optionally fails them.
    #[derive(Default)]
    pub struct RecordingPeerClient {
        calls: Mutex<Vec<(NodeAddress, SessionId)>>,
        fail: bool,
    }

    impl RecordingPeerClient {
        /// A client whose calls succeed.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// A client whose calls fail.
        #[must_use]
        pub fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        /// Calls made so far.
        #[must_use]
        pub fn calls(&self) -> Vec<(NodeAddress, SessionId)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl PeerClient for RecordingPeerClient {
        async fn close_session(&self, owner: &NodeAddress, session_id: &SessionId) -> Result<()> {
            self.calls.lock().push((owner.clone(), *session_id));
            if self.fail {
                return Err(ControlError::Peer {
                    owner: owner.clone(),
                    reason: "injected failure".to_string(),
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn owner_of(server: &MockServer) -> NodeAddress {
        NodeAddress::from(*server.address())
    }

    fn client() -> HttpPeerClient {
        HttpPeerClient::new(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn close_url_shape() {
        let id: SessionId = "6f1c2a9e-8d55-4b8e-9c4a-0f2b7d1e3a44".parse().unwrap();
        let url = HttpPeerClient::close_url(&NodeAddress::new("10.0.0.3", 9091), &id);
        assert_eq!(
            url,
            "http://10.0.0.3:9091/internal/v1/sessions/6f1c2a9e-8d55-4b8e-9c4a-0f2b7d1e3a44"
        );
    }

    #[tokio::test]
    async fn close_hits_owner() {
        let server = MockServer::start().await;
        let id = SessionId::generate();
        Mock::given(method("DELETE"))
            .and(path(format!("{INTERNAL_SESSIONS_PATH}/{id}")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client().close_session(&owner_of(&server), &id).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_session_on_peer_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        client()
            .close_session(&owner_of(&server), &SessionId::generate())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn peer_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {"code": "INTERNAL", "message": "store unavailable"}
            })))
            .mount(&server)
            .await;

        let err = client()
            .close_session(&owner_of(&server), &SessionId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Peer { ref reason, .. } if reason == "store unavailable"));
    }
}
