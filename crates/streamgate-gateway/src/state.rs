//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use streamgate_cluster::NodeDirectory;
use streamgate_control::SessionManager;
use streamgate_store::SessionStore;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
pub struct GatewayState<S> {
    /// Session lifecycle.
    pub manager: Arc<SessionManager<S>>,
    /// Live peer nodes.
    pub directory: Arc<NodeDirectory>,
    /// Gateway configuration.
    pub config: GatewayConfig,
    ready: Arc<AtomicBool>,
}

impl<S: SessionStore + 'static> GatewayState<S> {
    /// Create a new gateway state. The node starts out not ready.
    #[must_use]
    pub fn new(
        manager: Arc<SessionManager<S>>,
        directory: Arc<NodeDirectory>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            manager,
            directory,
            config,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The session store behind the manager.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        self.manager.store()
    }

    /// Mark the node ready to serve traffic.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Whether the node has finished starting.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl<S> Clone for GatewayState<S> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            directory: Arc::clone(&self.directory),
            config: self.config.clone(),
            ready: Arc::clone(&self.ready),
        }
    }
}
