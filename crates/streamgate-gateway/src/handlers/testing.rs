//! Shared fixtures for handler tests.

use std::sync::Arc;

use axum_test::TestServer;
use chrono::Utc;
use streamgate_cluster::{ClusterConfig, MockMembership, NodeDirectory};
use streamgate_control::peer_client::mock::RecordingPeerClient;
use streamgate_control::{SessionConfig, SessionManager};
use streamgate_core::{NodeAddress, SessionId};
use streamgate_store::mock::MockSessionStore;
use streamgate_store::{SessionRecord, TransportKind};

use crate::config::GatewayConfig;
use crate::routes::create_router;
use crate::state::GatewayState;

pub(crate) fn local() -> NodeAddress {
    NodeAddress::new("10.0.0.1", 9091)
}

pub(crate) fn remote() -> NodeAddress {
    NodeAddress::new("10.0.0.2", 9091)
}

pub(crate) struct Fixture {
    pub store: Arc<MockSessionStore>,
    pub membership: Arc<MockMembership>,
    pub peer: Arc<RecordingPeerClient>,
    pub state: GatewayState<MockSessionStore>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MockSessionStore::new());
        let membership = Arc::new(MockMembership::new());
        let peer = Arc::new(RecordingPeerClient::new());

        let manager = Arc::new(SessionManager::new(
            Arc::clone(&store),
            local(),
            peer.clone(),
            SessionConfig::default(),
        ));
        let directory = Arc::new(NodeDirectory::new(
            membership.clone(),
            ClusterConfig::default(),
            local(),
        ));
        let state = GatewayState::new(manager, directory, GatewayConfig::default());

        Self {
            store,
            membership,
            peer,
            state,
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(create_router(self.state.clone())).unwrap()
    }

    /// Insert a record owned by `owner` directly into the store.
    pub fn seed(&self, owner: NodeAddress) -> SessionId {
        let record = SessionRecord::new(SessionId::generate(), TransportKind::Sse, owner, Utc::now());
        let id = record.session_id;
        self.store.insert(record);
        id
    }
}

pub(crate) async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
