//! Nacos naming-service membership client.
//!
//! Queries `GET {base}/nacos/v1/ns/instance/list?serviceName=..&groupName=..`
//! and maps the `hosts` array of the response.
//!
//! The node announces itself as an ephemeral instance with
//! `POST /nacos/v1/ns/instance`, keeps it alive with
//! `PUT /nacos/v1/ns/instance/beat` and withdraws it with
//! `DELETE /nacos/v1/ns/instance`. Nacos drops an ephemeral instance whose
//! beats stop, so a crashed node disappears without a deregister.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{ClusterError, Result};
use crate::membership::MembershipClient;
use crate::types::MemberInstance;

const INSTANCE_LIST_PATH: &str = "/nacos/v1/ns/instance/list";
const INSTANCE_PATH: &str = "/nacos/v1/ns/instance";
const BEAT_PATH: &str = "/nacos/v1/ns/instance/beat";
const DEFAULT_CLUSTER: &str = "DEFAULT";

/// HTTP client for a Nacos registry.
pub struct NacosMembership {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct InstanceList {
    #[serde(default)]
    hosts: Vec<NacosHost>,
}

#[derive(Debug, Deserialize)]
struct NacosHost {
    ip: String,
    port: u16,
    #[serde(default)]
    healthy: bool,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

const fn default_enabled() -> bool {
    true
}

impl From<NacosHost> for MemberInstance {
    fn from(host: NacosHost) -> Self {
        Self {
            host: host.ip,
            port: host.port,
            healthy: host.healthy,
            enabled: host.enabled,
            metadata: host.metadata,
        }
    }
}

impl NacosMembership {
    /// Create a client for the registry at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ClusterError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClusterError::Registry {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Query parameters naming one instance.
fn instance_params(
    service_name: &str,
    group: &str,
    instance: &MemberInstance,
) -> Vec<(&'static str, String)> {
    vec![
        ("serviceName", service_name.to_string()),
        ("groupName", group.to_string()),
        ("ip", instance.host.clone()),
        ("port", instance.port.to_string()),
        ("clusterName", DEFAULT_CLUSTER.to_string()),
        ("ephemeral", "true".to_string()),
    ]
}

#[async_trait]
impl MembershipClient for NacosMembership {
    async fn list_instances(&self, service_name: &str, group: &str) -> Result<Vec<MemberInstance>> {
        let url = format!("{}{INSTANCE_LIST_PATH}", self.base_url);

        let response = self
            .send(
                self.http_client
                    .get(&url)
                    .query(&[("serviceName", service_name), ("groupName", group)]),
            )
            .await?;

        let list: InstanceList = response.json().await?;
        debug!(service_name, group, count = list.hosts.len(), "Nacos instance list");

        Ok(list.hosts.into_iter().map(MemberInstance::from).collect())
    }

    async fn register(
        &self,
        service_name: &str,
        group: &str,
        instance: &MemberInstance,
    ) -> Result<()> {
        let url = format!("{}{INSTANCE_PATH}", self.base_url);
        let metadata = serde_json::to_string(&instance.metadata)
            .map_err(|e| ClusterError::Config(format!("Unencodable instance metadata: {e}")))?;

        let mut params = instance_params(service_name, group, instance);
        params.extend([
            ("healthy", instance.healthy.to_string()),
            ("enabled", instance.enabled.to_string()),
            ("weight", "1.0".to_string()),
            ("metadata", metadata),
        ]);

        self.send(self.http_client.post(&url).query(&params)).await?;
        debug!(service_name, group, host = %instance.host, port = instance.port, "Registered with Nacos");
        Ok(())
    }

    async fn heartbeat(
        &self,
        service_name: &str,
        group: &str,
        instance: &MemberInstance,
    ) -> Result<()> {
        let url = format!("{}{BEAT_PATH}", self.base_url);
        let beat = json!({
            "serviceName": format!("{group}@@{service_name}"),
            "ip": instance.host,
            "port": instance.port,
            "cluster": DEFAULT_CLUSTER,
            "weight": 1.0,
            "metadata": instance.metadata,
            "scheduled": false,
        });

        let mut params = instance_params(service_name, group, instance);
        params.push(("beat", beat.to_string()));

        self.send(self.http_client.put(&url).query(&params)).await?;
        Ok(())
    }

    async fn deregister(
        &self,
        service_name: &str,
        group: &str,
        instance: &MemberInstance,
    ) -> Result<()> {
        let url = format!("{}{INSTANCE_PATH}", self.base_url);
        let params = instance_params(service_name, group, instance);

        self.send(self.http_client.delete(&url).query(&params)).await?;
        debug!(service_name, group, host = %instance.host, port = instance.port, "Deregistered from Nacos");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "nacos"
    }
}
