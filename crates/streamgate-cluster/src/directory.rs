//! The node directory.
//!
//! Resolves the currently-alive gateway nodes. The answer is never empty: if
//! the registry fails, is empty, or lists no healthy+enabled instance, the
//! directory answers with the local node alone so callers can always route
//! somewhere.

use std::sync::Arc;

use streamgate_core::NodeAddress;
use tracing::{info, warn};

use crate::membership::MembershipClient;
use crate::types::{ClusterConfig, ClusterNode};

/// Answers "which gateway nodes are alive right now".
///
/// Results are computed on every call and never cached.
pub struct NodeDirectory {
    membership: Arc<dyn MembershipClient>,
    config: ClusterConfig,
    local: ClusterNode,
}

impl NodeDirectory {
    /// Create a directory for the node reachable at `local_address`.
    #[must_use]
    pub fn new(
        membership: Arc<dyn MembershipClient>,
        config: ClusterConfig,
        local_address: NodeAddress,
    ) -> Self {
        Self {
            membership,
            config,
            local: ClusterNode::local(local_address),
        }
    }

    /// The self-description of this node.
    #[must_use]
    pub fn local_node(&self) -> &ClusterNode {
        &self.local
    }

    /// List the healthy and enabled gateway nodes. Never empty.
    pub async fn list_active_nodes(&self) -> Vec<ClusterNode> {
        let service_name = &self.config.service_name;
        let group = &self.config.group;

        let instances = match self.membership.list_instances(service_name, group).await {
            Ok(instances) => instances,
            Err(e) => {
                warn!(
                    backend = self.membership.backend_name(),
                    service_name = %service_name,
                    group = %group,
                    error = %e,
                    "Node discovery failed, using local node only"
                );
                return vec![self.local.clone()];
            }
        };

        if instances.is_empty() {
            warn!(
                backend = self.membership.backend_name(),
                service_name = %service_name,
                group = %group,
                "No gateway instances registered, using local node only"
            );
            return vec![self.local.clone()];
        }

        let active: Vec<ClusterNode> = instances
            .into_iter()
            .filter(|i| i.is_active())
            .map(ClusterNode::from)
            .collect();

        if active.is_empty() {
            warn!(
                backend = self.membership.backend_name(),
                "No healthy gateway instances, using local node only"
            );
            return vec![self.local.clone()];
        }

        info!(
            count = active.len(),
            nodes = %active.iter().map(|n| n.address.to_string()).collect::<Vec<_>>().join(", "),
            "Found active gateway nodes"
        );
        active
    }

    /// Whether `address` is currently an active node.
    pub async fn is_active(&self, address: &NodeAddress) -> bool {
        self.list_active_nodes()
            .await
            .iter()
            .any(|node| node.address == *address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::mock::MockMembership;
    use crate::membership::StaticMembership;
    use crate::types::MemberInstance;
    use std::collections::BTreeMap;

    fn local() -> NodeAddress {
        NodeAddress::new("10.0.0.9", 9091)
    }

    fn instance(host: &str, healthy: bool, enabled: bool) -> MemberInstance {
        MemberInstance {
            host: host.to_string(),
            port: 9091,
            healthy,
            enabled,
            metadata: BTreeMap::from([("version".to_string(), "1".to_string())]),
        }
    }

    fn directory(membership: Arc<MockMembership>) -> NodeDirectory {
        NodeDirectory::new(membership, ClusterConfig::default(), local())
    }

    #[tokio::test]
    async fn connectivity_error_yields_self() {
        let membership = Arc::new(MockMembership::new());
        membership.set_unreachable();
        let dir = directory(membership);

        let nodes = dir.list_active_nodes().await;
        assert_eq!(nodes, vec![ClusterNode::local(local())]);
    }

    #[tokio::test]
    async fn zero_instances_yields_self() {
        let dir = directory(Arc::new(MockMembership::new()));
        let nodes = dir.list_active_nodes().await;
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].address, local());
        assert!(nodes[0].healthy && nodes[0].enabled);
    }

    #[tokio::test]
    async fn all_unhealthy_yields_self() {
        let membership = Arc::new(MockMembership::new());
        membership.set_instances(vec![
            instance("10.0.0.1", false, true),
            instance("10.0.0.2", true, false),
        ]);
        let nodes = directory(membership).list_active_nodes().await;
        assert_eq!(nodes, vec![ClusterNode::local(local())]);
    }

    #[tokio::test]
    async fn filters_and_keeps_metadata() {
        let membership = Arc::new(MockMembership::new());
        membership.set_instances(vec![
            instance("10.0.0.1", true, true),
            instance("10.0.0.2", false, true),
            instance("10.0.0.3", true, true),
        ]);
        let dir = directory(Arc::clone(&membership));

        let nodes = dir.list_active_nodes().await;
        let hosts: Vec<_> = nodes.iter().map(|n| n.address.host().to_string()).collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.3"]);
        assert_eq!(nodes[0].metadata["version"], "1");

        assert_eq!(
            membership.queries()[0],
            ("streamgate".to_string(), "mcp-server".to_string())
        );
    }

    #[tokio::test]
    async fn is_active_checks_membership() {
        let membership = Arc::new(MockMembership::new());
        membership.set_instances(vec![instance("10.0.0.1", true, true)]);
        let dir = directory(membership);

        assert!(dir.is_active(&NodeAddress::new("10.0.0.1", 9091)).await);
        assert!(!dir.is_active(&NodeAddress::new("10.0.0.2", 9091)).await);
    }

    #[tokio::test]
    async fn static_membership_is_self_only() {
        let dir = NodeDirectory::new(Arc::new(StaticMembership), ClusterConfig::default(), local());
        assert_eq!(dir.list_active_nodes().await, vec![dir.local_node().clone()]);
        assert!(dir.is_active(&local()).await);
    }
}
