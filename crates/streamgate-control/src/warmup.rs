//! One-shot downstream connection warmup.
//!
//! After the node reports ready, the orchestrator walks the approved-service
//! catalog and establishes a reference for every admitted interface so the
//! first real request does not pay the connection cost. It runs on a
//! detached task and never blocks startup.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::{AdmissionPolicy, ServiceCatalog};
use crate::connector::ReferenceRegistry;
use crate::error::{ControlError, Result};
use crate::types::{EndpointInfo, ServiceDescriptor, WarmupReport};

/// Pick the endpoint to warm: the first online one, else the first listed.
#[must_use]
pub fn select_endpoint(endpoints: &[EndpointInfo]) -> Option<&EndpointInfo> {
    endpoints
        .iter()
        .find(|e| e.online)
        .or_else(|| endpoints.first())
}

/// Warms downstream references once per process.
pub struct WarmupOrchestrator {
    catalog: Arc<dyn ServiceCatalog>,
    policy: Arc<dyn AdmissionPolicy>,
    registry: Arc<ReferenceRegistry>,
}

impl WarmupOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ServiceCatalog>,
        policy: Arc<dyn AdmissionPolicy>,
        registry: Arc<ReferenceRegistry>,
    ) -> Self {
        Self {
            catalog,
            policy,
            registry,
        }
    }

    /// Warm every admitted service sequentially and report the outcome.
    pub async fn run(&self) -> WarmupReport {
        let started = Instant::now();

        let services = match self.catalog.find_approved_services().await {
            Ok(services) => services,
            Err(e) => {
                warn!(error = %e, "Failed to load approved services, skipping warmup");
                return WarmupReport::default();
            }
        };
        if services.is_empty() {
            info!("No approved services, skipping warmup");
            return WarmupReport::default();
        }

        let admitted: Vec<_> = if self.policy.is_configured() {
            services
                .into_iter()
                .filter(|s| self.policy.is_allowed(&s.interface_name))
                .collect()
        } else {
            services
        };
        if admitted.is_empty() {
            info!("No approved service passed the whitelist, skipping warmup");
            return WarmupReport::default();
        }

        let mut report = WarmupReport {
            admitted: admitted.len(),
            ..WarmupReport::default()
        };

        for service in &admitted {
            match self.warm(service).await {
                Ok(address) => {
                    debug!(
                        interface_name = %service.interface_name,
                        version = %service.version,
                        address = %address,
                        "Service warmed"
                    );
                    report.succeeded += 1;
                }
                Err(e) => {
                    warn!(
                        interface_name = %service.interface_name,
                        version = %service.version,
                        error = %e,
                        "Failed to warm service"
                    );
                    report.failed += 1;
                }
            }
        }

        report.elapsed = started.elapsed();
        info!(
            admitted = report.admitted,
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Warmup finished"
        );
        report
    }

    async fn warm(&self, service: &ServiceDescriptor) -> Result<String> {
        let endpoints = self.catalog.get_endpoints(&service.id).await?;
        let endpoint = select_endpoint(&endpoints)
            .ok_or_else(|| ControlError::NoEndpoints(service.interface_name.clone()))?;

        // The endpoint's advertised version wins over the catalog entry.
        let version = endpoint.version.as_deref().unwrap_or(&service.version);
        let reference = self
            .registry
            .get_or_establish(&service.interface_name, version, endpoint)
            .await?;
        Ok(reference.address.clone())
    }

    /// Run once `ready` fires. A dropped sender cancels the run.
    pub fn spawn(self: Arc<Self>, ready: oneshot::Receiver<()>) -> JoinHandle<Option<WarmupReport>> {
        tokio::spawn(async move {
            if ready.await.is_err() {
                debug!("Readiness signal dropped, warmup not started");
                return None;
            }
            Some(self.run().await)
        })
    }
}
