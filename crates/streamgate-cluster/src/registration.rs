//! Announcing this node to the membership registry.
//!
//! The node registers once it is ready to serve, beats on a fixed period
//! while it runs, and deregisters during shutdown.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use streamgate_core::NodeAddress;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::membership::MembershipClient;
use crate::types::{ClusterConfig, MemberInstance};

/// The registry entry for this node.
pub struct SelfRegistration {
    membership: Arc<dyn MembershipClient>,
    service_name: String,
    group: String,
    instance: MemberInstance,
    heartbeat_interval: Duration,
}

impl SelfRegistration {
    /// Describe the node reachable at `local` under the configured service.
    #[must_use]
    pub fn new(
        membership: Arc<dyn MembershipClient>,
        config: &ClusterConfig,
        local: &NodeAddress,
    ) -> Self {
        let metadata = BTreeMap::from([
            ("application".to_string(), config.service_name.clone()),
            ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            ("node_type".to_string(), "gateway".to_string()),
            ("start_time".to_string(), Utc::now().timestamp_millis().to_string()),
        ]);

        Self {
            membership,
            service_name: config.service_name.clone(),
            group: config.group.clone(),
            instance: MemberInstance {
                host: local.host().to_string(),
                port: local.port(),
                healthy: true,
                enabled: true,
                metadata,
            },
            heartbeat_interval: config.heartbeat_interval,
        }
    }

    /// The instance this node registers as.
    #[must_use]
    pub fn instance(&self) -> &MemberInstance {
        &self.instance
    }

    /// Register with the registry.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the registration is rejected.
    pub async fn register(&self) -> Result<()> {
        self.membership
            .register(&self.service_name, &self.group, &self.instance)
            .await?;
        info!(
            backend = self.membership.backend_name(),
            service_name = %self.service_name,
            group = %self.group,
            host = %self.instance.host,
            port = self.instance.port,
            "Registered gateway node"
        );
        Ok(())
    }

    /// Withdraw the registration.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the registry cannot be reached.
    pub async fn deregister(&self) -> Result<()> {
        self.membership
            .deregister(&self.service_name, &self.group, &self.instance)
            .await?;
        info!(
            backend = self.membership.backend_name(),
            service_name = %self.service_name,
            group = %self.group,
            "Deregistered gateway node"
        );
        Ok(())
    }

    /// Beat forever on the configured period. A failed beat is logged and
    /// the next one is tried on schedule.
    pub async fn run_heartbeat(self: Arc<Self>) {
        let period = self.heartbeat_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self
                .membership
                .heartbeat(&self.service_name, &self.group, &self.instance)
                .await
            {
                Ok(()) => debug!(service_name = %self.service_name, "Registry heartbeat sent"),
                Err(e) => warn!(
                    backend = self.membership.backend_name(),
                    error = %e,
                    "Registry heartbeat failed"
                ),
            }
        }
    }

    /// Spawn [`run_heartbeat`](Self::run_heartbeat) on the runtime.
    pub fn spawn_heartbeat(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run_heartbeat())
    }
}
