//! Types for cluster membership.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamgate_core::NodeAddress;

use crate::error::{ClusterError, Result};

/// A peer gateway node as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    /// Reachable `host:port` of the node.
    pub address: NodeAddress,
    /// Whether the registry considers the node healthy.
    pub healthy: bool,
    /// Whether the node accepts traffic.
    pub enabled: bool,
    /// Registry metadata, passed through unmodified.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ClusterNode {
    /// Self-description used when the registry has nothing better to offer.
    #[must_use]
    pub fn local(address: NodeAddress) -> Self {
        Self {
            address,
            healthy: true,
            enabled: true,
            metadata: BTreeMap::new(),
        }
    }
}

/// One instance as returned by a membership backend, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInstance {
    /// IP or hostname.
    pub host: String,
    /// Serving port.
    pub port: u16,
    /// Registry health flag.
    pub healthy: bool,
    /// Registry enabled flag.
    pub enabled: bool,
    /// Registry metadata.
    pub metadata: BTreeMap<String, String>,
}

impl MemberInstance {
    /// Whether the instance should receive traffic.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.healthy && self.enabled
    }
}

impl From<MemberInstance> for ClusterNode {
    fn from(instance: MemberInstance) -> Self {
        Self {
            address: NodeAddress::new(instance.host, instance.port),
            healthy: instance.healthy,
            enabled: instance.enabled,
            metadata: instance.metadata,
        }
    }
}

/// Which registry the directory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipBackend {
    /// No registry; the node only knows itself.
    #[default]
    Static,
    /// Nacos-style HTTP naming service.
    Nacos,
    /// Kubernetes pods selected by label.
    Kubernetes,
}

impl FromStr for MembershipBackend {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" | "none" => Ok(Self::Static),
            "nacos" => Ok(Self::Nacos),
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            other => Err(ClusterError::Config(format!(
                "unknown membership backend {other:?} (expected static, nacos or kubernetes)"
            ))),
        }
    }
}

/// Configuration for cluster membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Registry to query.
    #[serde(default)]
    pub backend: MembershipBackend,
    /// Service name gateway nodes register under.
    #[serde(default = "ClusterConfig::default_service_name")]
    pub service_name: String,
    /// Registry group. For Kubernetes this is the namespace.
    #[serde(default = "ClusterConfig::default_group")]
    pub group: String,
    /// Base URL of the Nacos server.
    #[serde(default = "ClusterConfig::default_nacos_url")]
    pub nacos_url: String,
    /// Port peers serve on when the registry does not report one (Kubernetes).
    #[serde(default = "ClusterConfig::default_peer_port")]
    pub peer_port: u16,
    /// Timeout for a single registry query.
    #[serde(default = "ClusterConfig::default_request_timeout")]
    pub request_timeout: Duration,
    /// Whether the node announces itself to the registry once ready.
    #[serde(default = "ClusterConfig::default_register_self")]
    pub register_self: bool,
    /// Period between registration heartbeats.
    #[serde(default = "ClusterConfig::default_heartbeat_interval")]
    pub heartbeat_interval: Duration,
}

impl ClusterConfig {
    fn default_service_name() -> String {
        "streamgate".to_string()
    }

    fn default_group() -> String {
        "mcp-server".to_string()
    }

    fn default_nacos_url() -> String {
        "http://127.0.0.1:8848".to_string()
    }

    const fn default_peer_port() -> u16 {
        9091
    }

    const fn default_request_timeout() -> Duration {
        Duration::from_secs(3)
    }

    const fn default_register_self() -> bool {
        true
    }

    const fn default_heartbeat_interval() -> Duration {
        Duration::from_secs(5)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `MEMBERSHIP_BACKEND`: `static`, `nacos` or `kubernetes`
    /// - `CLUSTER_SERVICE_NAME`: registry service name
    /// - `CLUSTER_GROUP`: registry group / Kubernetes namespace
    /// - `NACOS_URL`: Nacos base URL
    /// - `CLUSTER_REGISTER`: `false` to skip self-registration
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Config` for an unknown backend.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MEMBERSHIP_BACKEND") {
            config.backend = val.parse()?;
        }
        if let Ok(val) = std::env::var("CLUSTER_SERVICE_NAME") {
            config.service_name = val;
        }
        if let Ok(val) = std::env::var("CLUSTER_GROUP") {
            config.group = val;
        }
        if let Ok(val) = std::env::var("NACOS_URL") {
            config.nacos_url = val;
        }
        if let Ok(val) = std::env::var("CLUSTER_REGISTER") {
            config.register_self = !matches!(val.trim(), "false" | "0" | "no");
        }

        Ok(config)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            backend: MembershipBackend::Static,
            service_name: Self::default_service_name(),
            group: Self::default_group(),
            nacos_url: Self::default_nacos_url(),
            peer_port: Self::default_peer_port(),
            request_timeout: Self::default_request_timeout(),
            register_self: Self::default_register_self(),
            heartbeat_interval: Self::default_heartbeat_interval(),
        }
    }
}

/// Best-effort detection of this host's outbound IP.
///
/// Connecting a UDP socket sends nothing; it only asks the kernel which local
/// address would route to the target. Falls back to `127.0.0.1`.
#[must_use]
pub fn detect_local_host() -> String {
    let probe = || -> std::io::Result<SocketAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        socket.local_addr()
    };

    match probe() {
        Ok(addr) if !addr.ip().is_unspecified() => addr.ip().to_string(),
        Ok(_) => Ipv4Addr::LOCALHOST.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to detect local IP, using 127.0.0.1");
            Ipv4Addr::LOCALHOST.to_string()
        }
    }
}
