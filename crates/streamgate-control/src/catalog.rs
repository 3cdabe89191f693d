//! Approved-service catalog and warmup admission policy.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ControlError, Result};
use crate::types::{EndpointInfo, ServiceDescriptor};

/// Source of downstream service definitions and their endpoints.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// All services in the `APPROVED` state.
    async fn find_approved_services(&self) -> Result<Vec<ServiceDescriptor>>;

    /// Known endpoints of a service, in registry order.
    async fn get_endpoints(&self, service_id: &str) -> Result<Vec<EndpointInfo>>;
}

/// Decides which downstream interfaces may be warmed.
pub trait AdmissionPolicy: Send + Sync {
    /// Whether any rule is configured. An unconfigured policy admits everything.
    fn is_configured(&self) -> bool;

    /// Whether `interface_name` is admitted.
    fn is_allowed(&self, interface_name: &str) -> bool;
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    services: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(flatten)]
    descriptor: ServiceDescriptor,
    #[serde(default)]
    endpoints: Vec<EndpointInfo>,
}

/// A catalog loaded once from JSON.
///
/// ```json
/// {"services": [{"id": "1", "interface_name": "com.acme.OrderService",
///   "version": "1.0.0", "approval": "APPROVED",
///   "endpoints": [{"address": "10.0.0.5:20880", "online": true}]}]}
/// ```
#[derive(Debug, Default)]
pub struct StaticCatalog {
    services: Vec<ServiceDescriptor>,
    endpoints: HashMap<String, Vec<EndpointInfo>>,
}

impl StaticCatalog {
    /// A catalog with no services.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a catalog from descriptors and their endpoints.
    #[must_use]
    pub fn new(entries: Vec<(ServiceDescriptor, Vec<EndpointInfo>)>) -> Self {
        let mut catalog = Self::default();
        for (descriptor, endpoints) in entries {
            catalog.endpoints.insert(descriptor.id.clone(), endpoints);
            catalog.services.push(descriptor);
        }
        catalog
    }

    /// Parse a catalog document.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Catalog` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| ControlError::Catalog(e.to_string()))?;
        Ok(Self::new(
            file.services
                .into_iter()
                .map(|entry| (entry.descriptor, entry.endpoints))
                .collect(),
        ))
    }

    /// Read and parse a catalog file.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Catalog` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ControlError::Catalog(format!("{}: {e}", path.display())))?;
        let catalog = Self::from_json(&json)?;
        debug!(path = %path.display(), services = catalog.services.len(), "Loaded service catalog");
        Ok(catalog)
    }

    /// Number of services, approved or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the catalog has no services.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[async_trait]
impl ServiceCatalog for StaticCatalog {
    async fn find_approved_services(&self) -> Result<Vec<ServiceDescriptor>> {
        Ok(self
            .services
            .iter()
            .filter(|s| s.is_approved())
            .cloned()
            .collect())
    }

    async fn get_endpoints(&self, service_id: &str) -> Result<Vec<EndpointInfo>> {
        Ok(self.endpoints.get(service_id).cloned().unwrap_or_default())
    }
}

/// Admits interfaces whose name starts with one of the configured prefixes.
#[derive(Debug, Clone, Default)]
pub struct PrefixWhitelist {
    prefixes: Vec<String>,
}

impl PrefixWhitelist {
    /// Create a whitelist. Blank prefixes are ignored.
    #[must_use]
    pub fn new<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .map(|p: String| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

impl AdmissionPolicy for PrefixWhitelist {
    fn is_configured(&self) -> bool {
        !self.prefixes.is_empty()
    }

    fn is_allowed(&self, interface_name: &str) -> bool {
        !self.is_configured() || self.prefixes.iter().any(|p| interface_name.starts_with(p))
    }
}
