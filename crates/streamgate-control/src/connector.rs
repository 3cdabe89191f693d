//! Downstream connection establishment and the shared reference registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ControlError, Result};
use crate::types::EndpointInfo;

/// A live handle to a downstream service instance.
#[derive(Debug)]
pub struct ServiceReference {
    /// Interface the reference serves.
    pub interface_name: String,
    /// Interface version.
    pub version: String,
    /// Endpoint the reference is bound to.
    pub address: String,
    /// When the reference was established.
    pub established_at: DateTime<Utc>,
    channel: Option<TcpStream>,
}

impl ServiceReference {
    /// Create a reference with no transport attached.
    #[must_use]
    pub fn new(
        interface_name: impl Into<String>,
        version: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            interface_name: interface_name.into(),
            version: version.into(),
            address: address.into(),
            established_at: Utc::now(),
            channel: None,
        }
    }

    /// Attach the connected transport.
    #[must_use]
    pub fn with_channel(mut self, channel: TcpStream) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Whether a transport is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }
}

/// Establishes connections to downstream endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect `interface_name`/`version` to `endpoint`.
    async fn establish(
        &self,
        interface_name: &str,
        version: &str,
        endpoint: &EndpointInfo,
    ) -> Result<ServiceReference>;
}

/// Opens a TCP connection to the endpoint address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    /// Create a connector with a per-connection timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn establish(
        &self,
        interface_name: &str,
        version: &str,
        endpoint: &EndpointInfo,
    ) -> Result<ServiceReference> {
        let connect_error = |reason: String| ControlError::Connect {
            interface_name: interface_name.to_string(),
            address: endpoint.address.clone(),
            reason,
        };

        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&endpoint.address))
            .await
            .map_err(|_| connect_error(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| connect_error(e.to_string()))?;

        debug!(interface_name, version, address = %endpoint.address, "Downstream connected");

        Ok(ServiceReference::new(interface_name, version, &endpoint.address).with_channel(stream))
    }
}

type ReferenceKey = (String, String);

/// References keyed by `(interface_name, version)`, populated lazily and
/// shared between warmup and live traffic.
pub struct ReferenceRegistry {
    connector: Arc<dyn Connector>,
    references: RwLock<HashMap<ReferenceKey, Arc<ServiceReference>>>,
}

impl ReferenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            references: RwLock::new(HashMap::new()),
        }
    }

    /// Look up an existing reference.
    #[must_use]
    pub fn get(&self, interface_name: &str, version: &str) -> Option<Arc<ServiceReference>> {
        self.references
            .read()
            .get(&(interface_name.to_string(), version.to_string()))
            .cloned()
    }

    /// Return the existing reference or establish one to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if a new reference cannot be established.
    pub async fn get_or_establish(
        &self,
        interface_name: &str,
        version: &str,
        endpoint: &EndpointInfo,
    ) -> Result<Arc<ServiceReference>> {
        if let Some(existing) = self.get(interface_name, version) {
            return Ok(existing);
        }

        let reference = Arc::new(
            self.connector
                .establish(interface_name, version, endpoint)
                .await?,
        );

        let key = (interface_name.to_string(), version.to_string());
        Ok(Arc::clone(
            self.references.write().entry(key).or_insert(reference),
        ))
    }

    /// Number of cached references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.references.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.read().is_empty()
    }
}

/// Test connectors.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Records every attempt and fails for configured addresses.
    #[derive(Default)]
    pub struct MockConnector {
        attempts: Mutex<Vec<(String, String, String)>>,
        failing: Mutex<Vec<String>>,
    }

    impl MockConnector {
        /// Create a connector that always succeeds.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make connections to `address` fail.
        pub fn fail_address(&self, address: impl Into<String>) {
            self.failing.lock().push(address.into());
        }

        /// `(interface_name, version, address)` of every attempt.
        #[must_use]
        pub fn attempts(&self) -> Vec<(String, String, String)> {
            self.attempts.lock().clone()
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn establish(
            &self,
            interface_name: &str,
            version: &str,
            endpoint: &EndpointInfo,
        ) -> Result<ServiceReference> {
            self.attempts.lock().push((
                interface_name.to_string(),
                version.to_string(),
                endpoint.address.clone(),
            ));

            if self.failing.lock().contains(&endpoint.address) {
                return Err(ControlError::Connect {
                    interface_name: interface_name.to_string(),
                    address: endpoint.address.clone(),
                    reason: "connection refused".to_string(),
                });
            }

            Ok(ServiceReference::new(interface_name, version, &endpoint.address))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockConnector;
    use super::*;
    use tokio::net::TcpListener;

    fn endpoint(address: &str) -> EndpointInfo {
        EndpointInfo {
            address: address.to_string(),
            online: true,
            healthy: true,
            protocol: None,
            version: None,
            group: None,
        }
    }

    #[tokio::test]
    async fn tcp_connector_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let connector = TcpConnector::new(Duration::from_secs(1));
        let reference = connector
            .establish("com.acme.OrderService", "1.0.0", &endpoint(&address))
            .await
            .unwrap();

        assert!(reference.is_connected());
        assert_eq!(reference.address, address);
    }

    #[tokio::test]
    async fn tcp_connector_reports_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let connector = TcpConnector::new(Duration::from_secs(1));
        let err = connector
            .establish("com.acme.OrderService", "1.0.0", &endpoint(&address))
            .await
            .unwrap_err();

        assert!(matches!(err, ControlError::Connect { .. }));
    }

    #[tokio::test]
    async fn registry_reuses_references() {
        let connector = Arc::new(MockConnector::new());
        let registry = ReferenceRegistry::new(connector.clone());
        let ep = endpoint("10.0.0.5:20880");

        let first = registry
            .get_or_establish("com.acme.OrderService", "1.0.0", &ep)
            .await
            .unwrap();
        let second = registry
            .get_or_establish("com.acme.OrderService", "1.0.0", &ep)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.attempts().len(), 1);

        registry
            .get_or_establish("com.acme.OrderService", "2.0.0", &ep)
            .await
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn registry_does_not_cache_failures() {
        let connector = Arc::new(MockConnector::new());
        connector.fail_address("10.0.0.9:20880");
        let registry = ReferenceRegistry::new(connector.clone());

        let result = registry
            .get_or_establish("com.acme.OrderService", "1.0.0", &endpoint("10.0.0.9:20880"))
            .await;

        assert!(result.is_err());
        assert!(registry.is_empty());
        assert!(registry.get("com.acme.OrderService", "1.0.0").is_none());
    }
}
