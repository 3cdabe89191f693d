//! Session lifecycle management.
//!
//! The [`SessionManager`] owns this node's local connection table: the map
//! from session id to the live outbound channel of a streaming connection.
//! Dropping an entry drops the channel sender, which ends the client stream,
//! so removing from the table is the only way a transport resource is
//! released. Every lifecycle event is mirrored into the shared
//! [`SessionStore`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use streamgate_core::{NodeAddress, SessionId};
use streamgate_store::{SessionRecord, SessionStore, TransportKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ControlError, Result};
use crate::peer_client::PeerClient;
use crate::types::SessionConfig;

/// A message queued for delivery to a connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: String,
}

impl OutboundMessage {
    /// Create a new message.
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// What the transport layer gets back from [`SessionManager::create_session`].
#[derive(Debug)]
pub struct SessionHandle {
    /// The new session's id.
    pub session_id: SessionId,
    /// Receiving half of the session's outbound channel. Ends when the
    /// session is removed.
    pub receiver: mpsc::Receiver<OutboundMessage>,
}

struct LocalConnection {
    sender: mpsc::Sender<OutboundMessage>,
    transport: TransportKind,
    opened_at: DateTime<Utc>,
}

/// Tracks the sessions held by this node and mirrors them into the store.
pub struct SessionManager<S> {
    store: Arc<S>,
    local_node: NodeAddress,
    connections: RwLock<HashMap<SessionId, LocalConnection>>,
    peer: Arc<dyn PeerClient>,
    config: SessionConfig,
}

impl<S: SessionStore + 'static> SessionManager<S> {
    /// Create a manager for the node reachable at `local_node`.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        local_node: NodeAddress,
        peer: Arc<dyn PeerClient>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            local_node,
            connections: RwLock::new(HashMap::new()),
            peer,
            config,
        }
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The address recorded as owner of sessions created here.
    #[must_use]
    pub fn local_node(&self) -> &NodeAddress {
        &self.local_node
    }

    /// Run a store call under the configured timeout.
    async fn bounded<T>(&self, call: impl Future<Output = streamgate_store::Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result.map_err(ControlError::from),
            Err(_) => Err(ControlError::StoreTimeout(self.config.store_timeout)),
        }
    }

    /// Open a new session held by this node.
    ///
    /// The local connection is inserted first and rolled back if the store
    /// write fails, so a failed call leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written to the store.
    pub async fn create_session(
        &self,
        transport: TransportKind,
        endpoint: Option<String>,
    ) -> Result<SessionHandle> {
        let session_id = SessionId::generate();
        let now = Utc::now();
        let (sender, receiver) = mpsc::channel(self.config.channel_capacity.max(1));

        self.connections.write().insert(
            session_id,
            LocalConnection {
                sender,
                transport,
                opened_at: now,
            },
        );

        let record = SessionRecord::new(session_id, transport, self.local_node.clone(), now)
            .with_endpoint(endpoint);

        if let Err(e) = self.bounded(self.store.put(&record)).await {
            self.connections.write().remove(&session_id);
            warn!(session_id = %session_id, error = %e, "Failed to register session, rolled back");
            return Err(e);
        }

        info!(
            session_id = %session_id,
            transport = %transport,
            endpoint = record.endpoint.as_deref().unwrap_or(""),
            "Session created"
        );

        Ok(SessionHandle {
            session_id,
            receiver,
        })
    }

    /// Refresh a session's activity time without waiting for the store.
    ///
    /// Must be called from within a tokio runtime.
    pub fn touch(&self, session_id: SessionId) {
        let store = Arc::clone(&self.store);
        let timeout = self.config.store_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, store.touch(&session_id, Utc::now())).await {
                Ok(Ok(true)) => debug!(session_id = %session_id, "Session touched"),
                Ok(Ok(false)) => debug!(session_id = %session_id, "Touch for unknown session ignored"),
                Ok(Err(e)) => warn!(session_id = %session_id, error = %e, "Failed to touch session"),
                Err(_) => warn!(session_id = %session_id, ?timeout, "Touch timed out"),
            }
        });
    }

    /// Refresh a session's activity time and wait for the result.
    ///
    /// Returns `false` if the session does not exist or the store failed.
    pub async fn refresh(&self, session_id: &SessionId) -> bool {
        match self.bounded(self.store.touch(session_id, Utc::now())).await {
            Ok(found) => found,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to refresh session");
                false
            }
        }
    }

    /// Remove a session: release the local connection and delete the record.
    ///
    /// Idempotent. Returns whether the store delete succeeded. If the session
    /// is held by another node, that node is asked to release it in the
    /// background.
    pub async fn remove_session(&self, session_id: &SessionId) -> bool {
        let local = self.connections.write().remove(session_id);

        let record = if local.is_some() {
            None
        } else {
            match self.bounded(self.store.get(session_id)).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to read session before removal");
                    None
                }
            }
        };

        let deleted = match self.bounded(self.store.delete(session_id)).await {
            Ok(existed) => {
                debug!(session_id = %session_id, existed, "Session record deleted");
                true
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to delete session record");
                false
            }
        };

        if let Some(record) = record.filter(|r| r.owner != self.local_node) {
            self.dispatch_close(record.owner, *session_id);
        }

        if let Some(conn) = local {
            let held_for = Utc::now() - conn.opened_at;
            info!(
                session_id = %session_id,
                transport = %conn.transport,
                held_secs = held_for.num_seconds(),
                "Session removed"
            );
        }

        deleted
    }

    fn dispatch_close(&self, owner: NodeAddress, session_id: SessionId) {
        let peer = Arc::clone(&self.peer);
        tokio::spawn(async move {
            match peer.close_session(&owner, &session_id).await {
                Ok(()) => debug!(session_id = %session_id, owner = %owner, "Peer close dispatched"),
                Err(e) => warn!(
                    session_id = %session_id,
                    owner = %owner,
                    error = %e,
                    "Peer close failed, owner will reconcile"
                ),
            }
        });
    }

    /// Record the downstream service a session talks to.
    ///
    /// Returns `false` if the session does not exist or the store failed.
    pub async fn bind_service(&self, session_id: &SessionId, service_name: &str) -> bool {
        match self
            .bounded(self.store.set_service(session_id, service_name))
            .await
        {
            Ok(found) => {
                if found {
                    debug!(session_id = %session_id, service_name, "Session bound to service");
                }
                found
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to bind service");
                false
            }
        }
    }

    /// Queue a message for a session held by this node.
    ///
    /// Returns `false` if the session is not held here or its client is gone.
    pub async fn send(&self, session_id: &SessionId, message: OutboundMessage) -> bool {
        let sender = self
            .connections
            .read()
            .get(session_id)
            .map(|conn| conn.sender.clone());

        match sender {
            Some(sender) => sender.send(message).await.is_ok(),
            None => false,
        }
    }

    /// Whether this node holds the session's connection.
    #[must_use]
    pub fn is_local(&self, session_id: &SessionId) -> bool {
        self.connections.read().contains_key(session_id)
    }

    /// Ids of the sessions held by this node.
    #[must_use]
    pub fn local_session_ids(&self) -> Vec<SessionId> {
        self.connections.read().keys().copied().collect()
    }

    /// Number of sessions held by this node.
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Delete records that name this node as owner but have no local
    /// connection. Run at startup, after a crash left records behind.
    ///
    /// Returns the number of records removed.
    pub async fn reconcile_orphans(&self) -> usize {
        let owned = match self.bounded(self.store.list_by_owner(&self.local_node)).await {
            Ok(records) => records,
            Err(e) => {
                warn!(owner = %self.local_node, error = %e, "Failed to list owned sessions");
                return 0;
            }
        };

        let mut removed = 0;
        for record in owned {
            if self.is_local(&record.session_id) {
                continue;
            }
            match self.bounded(self.store.delete(&record.session_id)).await {
                Ok(_) => removed += 1,
                Err(e) => {
                    warn!(session_id = %record.session_id, error = %e, "Failed to delete orphaned session");
                }
            }
        }

        if removed > 0 {
            info!(owner = %self.local_node, removed, "Removed orphaned session records");
        }
        removed
    }

    /// Remove every session held by this node. Returns how many were removed
    /// from the store.
    pub async fn shutdown(&self) -> usize {
        let ids = self.local_session_ids();
        let total = ids.len();

        let mut removed = 0;
        for session_id in ids {
            if self.remove_session(&session_id).await {
                removed += 1;
            }
        }

        info!(total, removed, "Session manager shut down");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer_client::mock::RecordingPeerClient;
    use crate::peer_client::NoopPeerClient;
    use streamgate_store::mock::MockSessionStore;
    use streamgate_store::RocksStore;
    use tempfile::TempDir;

    fn local() -> NodeAddress {
        NodeAddress::new("10.0.0.1", 9091)
    }

    fn manager_with(
        store: Arc<MockSessionStore>,
        peer: Arc<dyn PeerClient>,
    ) -> SessionManager<MockSessionStore> {
        SessionManager::new(store, local(), peer, SessionConfig::default())
    }

    fn manager(store: Arc<MockSessionStore>) -> SessionManager<MockSessionStore> {
        manager_with(store, Arc::new(NoopPeerClient::new()))
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn create_registers_locally_and_in_store() {
        let store = Arc::new(MockSessionStore::new());
        let mgr = manager(Arc::clone(&store));

        let handle = mgr
            .create_session(TransportKind::Sse, Some("orders".to_string()))
            .await
            .unwrap();

        assert!(mgr.is_local(&handle.session_id));
        let record = store.get(&handle.session_id).await.unwrap().unwrap();
        assert_eq!(record.owner, local());
        assert_eq!(record.created_at, record.last_active_at);
        assert_eq!(record.endpoint.as_deref(), Some("orders"));
    }

    #[tokio::test]
    async fn failed_store_write_rolls_back() {
        let store = Arc::new(MockSessionStore::new());
        store.set_fail_writes(true);
        let mgr = manager(Arc::clone(&store));

        let result = mgr.create_session(TransportKind::Sse, None).await;

        assert!(matches!(result, Err(ControlError::Store(_))));
        assert_eq!(mgr.local_count(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_closes_stream() {
        let store = Arc::new(MockSessionStore::new());
        let mgr = manager(Arc::clone(&store));
        let mut handle = mgr.create_session(TransportKind::Sse, None).await.unwrap();
        let id = handle.session_id;

        assert!(mgr.remove_session(&id).await);
        assert!(!mgr.is_local(&id));
        assert!(!store.contains(&id));
        assert!(handle.receiver.recv().await.is_none());

        assert!(mgr.remove_session(&id).await);
        assert!(mgr.remove_session(&SessionId::generate()).await);
    }

    #[tokio::test]
    async fn remove_reports_store_failure() {
        let store = Arc::new(MockSessionStore::new());
        let mgr = manager(Arc::clone(&store));
        let handle = mgr.create_session(TransportKind::Sse, None).await.unwrap();

        store.fail_delete_of(handle.session_id);
        assert!(!mgr.remove_session(&handle.session_id).await);
        assert!(!mgr.is_local(&handle.session_id));
    }

    #[tokio::test]
    async fn remote_session_dispatches_close_to_owner() {
        let store = Arc::new(MockSessionStore::new());
        let peer = Arc::new(RecordingPeerClient::new());
        let mgr = manager_with(Arc::clone(&store), peer.clone());

        let remote_owner = NodeAddress::new("10.0.0.2", 9091);
        let record = SessionRecord::new(
            SessionId::generate(),
            TransportKind::Sse,
            remote_owner.clone(),
            Utc::now(),
        );
        store.insert(record.clone());

        assert!(mgr.remove_session(&record.session_id).await);
        settle().await;

        assert!(!store.contains(&record.session_id));
        assert_eq!(peer.calls(), vec![(remote_owner, record.session_id)]);
    }

    #[tokio::test]
    async fn failed_peer_dispatch_is_tolerated() {
        let store = Arc::new(MockSessionStore::new());
        let peer = Arc::new(RecordingPeerClient::failing());
        let mgr = manager_with(Arc::clone(&store), peer.clone());

        let record = SessionRecord::new(
            SessionId::generate(),
            TransportKind::Sse,
            NodeAddress::new("10.0.0.2", 9091),
            Utc::now(),
        );
        store.insert(record.clone());

        assert!(mgr.remove_session(&record.session_id).await);
        settle().await;
        assert_eq!(peer.calls().len(), 1);
    }

    #[tokio::test]
    async fn local_session_is_not_dispatched() {
        let store = Arc::new(MockSessionStore::new());
        let peer = Arc::new(RecordingPeerClient::new());
        let mgr = manager_with(Arc::clone(&store), peer.clone());

        let handle = mgr.create_session(TransportKind::Sse, None).await.unwrap();
        mgr.remove_session(&handle.session_id).await;
        settle().await;

        assert!(peer.calls().is_empty());
    }

    #[tokio::test]
    async fn touch_refreshes_in_background() {
        let store = Arc::new(MockSessionStore::new());
        let mgr = manager(Arc::clone(&store));
        let handle = mgr.create_session(TransportKind::Sse, None).await.unwrap();
        let before = store.get(&handle.session_id).await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        mgr.touch(handle.session_id);
        settle().await;

        let after = store.get(&handle.session_id).await.unwrap().unwrap();
        assert!(after.last_active_at > before.last_active_at);
    }

    #[tokio::test]
    async fn touch_does_not_resurrect_removed_session() {
        let store = Arc::new(MockSessionStore::new());
        let mgr = manager(Arc::clone(&store));
        let handle = mgr.create_session(TransportKind::Sse, None).await.unwrap();

        mgr.remove_session(&handle.session_id).await;
        mgr.touch(handle.session_id);
        settle().await;

        assert!(!store.contains(&handle.session_id));
        assert!(!mgr.refresh(&handle.session_id).await);
    }

    #[tokio::test]
    async fn bind_and_send() {
        let store = Arc::new(MockSessionStore::new());
        let mgr = manager(Arc::clone(&store));
        let mut handle = mgr.create_session(TransportKind::Sse, None).await.unwrap();

        assert!(mgr.bind_service(&handle.session_id, "com.acme.OrderService").await);
        let record = store.get(&handle.session_id).await.unwrap().unwrap();
        assert_eq!(record.service_name.as_deref(), Some("com.acme.OrderService"));

        assert!(mgr.send(&handle.session_id, OutboundMessage::new("message", "hi")).await);
        let received = handle.receiver.recv().await.unwrap();
        assert_eq!(received.data, "hi");

        assert!(!mgr.send(&SessionId::generate(), OutboundMessage::new("message", "x")).await);
        assert!(!mgr.bind_service(&SessionId::generate(), "svc").await);
    }

    #[tokio::test]
    async fn reconcile_removes_only_orphans() {
        let store = Arc::new(MockSessionStore::new());
        let mgr = manager(Arc::clone(&store));
        let live = mgr.create_session(TransportKind::Sse, None).await.unwrap();

        let orphan = SessionRecord::new(SessionId::generate(), TransportKind::Sse, local(), Utc::now());
        let foreign = SessionRecord::new(
            SessionId::generate(),
            TransportKind::Sse,
            NodeAddress::new("10.0.0.2", 9091),
            Utc::now(),
        );
        store.insert(orphan.clone());
        store.insert(foreign.clone());

        assert_eq!(mgr.reconcile_orphans().await, 1);
        assert!(store.contains(&live.session_id));
        assert!(store.contains(&foreign.session_id));
        assert!(!store.contains(&orphan.session_id));
    }

    #[tokio::test]
    async fn shutdown_removes_everything_local() {
        let store = Arc::new(MockSessionStore::new());
        let mgr = manager(Arc::clone(&store));
        for _ in 0..3 {
            mgr.create_session(TransportKind::StreamableHttp, None).await.unwrap();
        }

        assert_eq!(mgr.shutdown().await, 3);
        assert_eq!(mgr.local_count(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn works_with_rocksdb() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let mgr = SessionManager::new(
            Arc::clone(&store),
            local(),
            Arc::new(NoopPeerClient::new()),
            SessionConfig::default(),
        );

        let handle = mgr.create_session(TransportKind::Sse, None).await.unwrap();
        assert_eq!(store.list_by_owner(&local()).await.unwrap().len(), 1);
        assert!(mgr.refresh(&handle.session_id).await);
        assert!(mgr.remove_session(&handle.session_id).await);
        assert!(store.list_all().await.unwrap().is_empty());
    }
}
