//! Configuration, catalog and report types for the control layer.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for any single store call made on behalf of a session.
    pub store_timeout: Duration,
    /// Capacity of each session's outbound channel.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(2000),
            channel_capacity: 64,
        }
    }
}

/// Configuration for the session reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Time between sweeps.
    pub period: Duration,
    /// Delay before the first sweep.
    pub initial_delay: Duration,
    /// Inactivity after which an SSE session is evicted.
    pub timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            initial_delay: Duration::from_secs(60),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Configuration for startup warmup.
#[derive(Debug, Clone)]
pub struct WarmupConfig {
    /// Whether warmup runs at all.
    pub enabled: bool,
    /// Interface prefixes admitted for warmup. Empty admits everything.
    pub whitelist: Vec<String>,
    /// JSON catalog of approved services. `None` means an empty catalog.
    pub catalog_path: Option<PathBuf>,
    /// Timeout for establishing one downstream connection.
    pub connect_timeout: Duration,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            whitelist: Vec::new(),
            catalog_path: None,
            connect_timeout: Duration::from_millis(3000),
        }
    }
}

/// Approval state of a downstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalState {
    /// Awaiting review.
    Pending,
    /// Eligible for proxying and warmup.
    Approved,
    /// Not eligible.
    Rejected,
}

/// A downstream service definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Catalog identifier.
    pub id: String,
    /// Fully qualified interface name (e.g. `com.acme.OrderService`).
    pub interface_name: String,
    /// Interface version.
    pub version: String,
    /// Service group.
    #[serde(default)]
    pub group: Option<String>,
    /// Approval state.
    pub approval: ApprovalState,
}

impl ServiceDescriptor {
    /// Whether the service may be warmed.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalState::Approved
    }
}

/// One backend instance of a downstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// `host:port`.
    pub address: String,
    /// Whether the instance is registered as online.
    pub online: bool,
    /// Whether the instance passes health checks.
    #[serde(default = "EndpointInfo::default_healthy")]
    pub healthy: bool,
    /// Wire protocol (e.g. `dubbo`).
    #[serde(default)]
    pub protocol: Option<String>,
    /// Served interface version.
    #[serde(default)]
    pub version: Option<String>,
    /// Served group.
    #[serde(default)]
    pub group: Option<String>,
}

impl EndpointInfo {
    const fn default_healthy() -> bool {
        true
    }
}

/// Aggregate outcome of one reaper sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records read from the store.
    pub scanned: usize,
    /// Records past the timeout window.
    pub expired: usize,
    /// Expired records removed.
    pub cleaned: usize,
    /// Expired records whose removal failed.
    pub failed: usize,
}

/// Aggregate outcome of a warmup run.
///
/// `succeeded + failed == admitted` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    /// Services that passed the admission policy.
    pub admitted: usize,
    /// Services with an established reference.
    pub succeeded: usize,
    /// Services that could not be warmed.
    pub failed: usize,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let reaper = ReaperConfig::default();
        assert_eq!(reaper.period, Duration::from_secs(60));
        assert_eq!(reaper.initial_delay, Duration::from_secs(60));
        assert_eq!(reaper.timeout, Duration::from_secs(600));

        let warmup = WarmupConfig::default();
        assert!(warmup.enabled);
        assert!(warmup.whitelist.is_empty());
    }

    #[test]
    fn descriptor_json() {
        let descriptor: ServiceDescriptor = serde_json::from_str(
            r#"{"id":"7","interface_name":"com.acme.OrderService","version":"1.0.0","approval":"APPROVED"}"#,
        )
        .unwrap();
        assert!(descriptor.is_approved());
        assert!(descriptor.group.is_none());
    }

    #[test]
    fn endpoint_defaults_to_healthy() {
        let endpoint: EndpointInfo =
            serde_json::from_str(r#"{"address":"10.0.0.1:20880","online":false}"#).unwrap();
        assert!(endpoint.healthy);
        assert!(!endpoint.online);
    }
}
