//! Kubernetes membership client.
//!
//! Gateway nodes are the pods labelled `app=<service_name>` in the namespace
//! named by the registry group. A pod is healthy when its `Ready` condition
//! is true, and enabled while it is running and not being deleted.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

use crate::error::Result;
use crate::membership::MembershipClient;
use crate::types::MemberInstance;

/// Lists gateway pods through the Kubernetes API.
pub struct K8sMembership {
    client: Client,
    peer_port: u16,
}

impl K8sMembership {
    /// Create a client using in-cluster config or the local kubeconfig.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes client cannot be created.
    pub async fn new(peer_port: u16) -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::with_client(client, peer_port))
    }

    /// Create a membership client with a pre-configured Kubernetes client.
    #[must_use]
    pub fn with_client(client: Client, peer_port: u16) -> Self {
        Self { client, peer_port }
    }
}

fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

fn is_pod_enabled(pod: &Pod) -> bool {
    let running = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Running");
    running && pod.metadata.deletion_timestamp.is_none()
}

/// Map a pod to a member instance. Pods without an IP are skipped.
pub(crate) fn pod_to_instance(pod: &Pod, peer_port: u16) -> Option<MemberInstance> {
    let host = pod.status.as_ref()?.pod_ip.clone()?;

    Some(MemberInstance {
        host,
        port: peer_port,
        healthy: is_pod_ready(pod),
        enabled: is_pod_enabled(pod),
        metadata: pod.metadata.labels.clone().unwrap_or_default(),
    })
}

#[async_trait]
impl MembershipClient for K8sMembership {
    async fn list_instances(&self, service_name: &str, group: &str) -> Result<Vec<MemberInstance>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), group);
        let params = ListParams::default().labels(&format!("app={service_name}"));

        let pod_list = pods.list(&params).await?;
        debug!(service_name, namespace = group, count = pod_list.items.len(), "Listed gateway pods");

        Ok(pod_list
            .items
            .iter()
            .filter_map(|pod| pod_to_instance(pod, self.peer_port))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "kubernetes"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn pod(ip: Option<&str>, phase: &str, ready: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("streamgate-0".to_string()),
                labels: Some(BTreeMap::from([
                    ("app".to_string(), "streamgate".to_string()),
                    ("zone".to_string(), "b".to_string()),
                ])),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                pod_ip: ip.map(str::to_string),
                phase: Some(phase.to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn ready_running_pod_is_active() {
        let instance = pod_to_instance(&pod(Some("10.1.0.4"), "Running", true), 9091).unwrap();
        assert_eq!(instance.host, "10.1.0.4");
        assert_eq!(instance.port, 9091);
        assert!(instance.is_active());
        assert_eq!(instance.metadata["zone"], "b");
    }

    #[test]
    fn unready_pod_is_unhealthy() {
        let instance = pod_to_instance(&pod(Some("10.1.0.4"), "Running", false), 9091).unwrap();
        assert!(!instance.healthy);
        assert!(instance.enabled);
    }

    #[test]
    fn terminating_pod_is_disabled() {
        let mut terminating = pod(Some("10.1.0.4"), "Running", true);
        terminating.metadata.deletion_timestamp = Some(Time(chrono_now()));
        let instance = pod_to_instance(&terminating, 9091).unwrap();
        assert!(!instance.enabled);
    }

    #[test]
    fn pending_pod_without_ip_is_skipped() {
        assert!(pod_to_instance(&pod(None, "Pending", false), 9091).is_none());
    }

    fn chrono_now() -> k8s_openapi::chrono::DateTime<k8s_openapi::chrono::Utc> {
        k8s_openapi::chrono::Utc::now()
    }
}
