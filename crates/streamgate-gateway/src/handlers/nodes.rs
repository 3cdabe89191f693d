//! Cluster node listing.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use streamgate_cluster::ClusterNode;
use streamgate_core::NodeAddress;
use streamgate_store::SessionStore;

use crate::state::GatewayState;

/// Response for `GET /v1/nodes`.
#[derive(Debug, Serialize)]
pub struct NodesResponse {
    /// This node.
    pub local: NodeAddress,
    /// Active nodes, never empty.
    pub nodes: Vec<ClusterNode>,
}

/// List the active gateway nodes.
pub async fn list_nodes<S: SessionStore + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
) -> Json<NodesResponse> {
    Json(NodesResponse {
        local: state.directory.local_node().address.clone(),
        nodes: state.directory.list_active_nodes().await,
    })
}

#[cfg(test)]
mod tests {
    use crate::handlers::testing::Fixture;

    #[tokio::test]
    async fn falls_back_to_self_when_registry_is_down() {
        let fixture = Fixture::new();
        fixture.membership.set_unreachable();

        let response = fixture.server().get("/v1/nodes").await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        let nodes = body["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0]["address"], "10.0.0.1:9091");
        assert_eq!(body["local"], "10.0.0.1:9091");
        assert_eq!(fixture.membership.queries().len(), 1);
    }
}
