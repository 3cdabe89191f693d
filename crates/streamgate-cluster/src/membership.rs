//! The membership client seam.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::MemberInstance;

/// Queries a cluster registry for the instances of a service.
#[async_trait]
pub trait MembershipClient: Send + Sync {
    /// List every registered instance of `service_name` in `group`, healthy or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be reached or answers garbage.
    async fn list_instances(&self, service_name: &str, group: &str) -> Result<Vec<MemberInstance>>;

    /// Announce `instance` as a member of `service_name` in `group`.
    ///
    /// Backends that discover nodes on their own accept this as a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry rejects or never sees the registration.
    async fn register(
        &self,
        _service_name: &str,
        _group: &str,
        _instance: &MemberInstance,
    ) -> Result<()> {
        Ok(())
    }

    /// Keep a registration made by [`register`](Self::register) alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be reached.
    async fn heartbeat(
        &self,
        _service_name: &str,
        _group: &str,
        _instance: &MemberInstance,
    ) -> Result<()> {
        Ok(())
    }

    /// Withdraw a registration made by [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be reached.
    async fn deregister(
        &self,
        _service_name: &str,
        _group: &str,
        _instance: &MemberInstance,
    ) -> Result<()> {
        Ok(())
    }

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Membership for a node running without a registry.
///
/// Always reports no instances, which makes the directory answer with the
/// local node only.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticMembership;

#[async_trait]
impl MembershipClient for StaticMembership {
    async fn list_instances(&self, _service_name: &str, _group: &str) -> Result<Vec<MemberInstance>> {
        Ok(Vec::new())
    }

    fn backend_name(&self) -> &'static str {
        "static"
    }
}

/// A mock membership client for testing without a registry.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::error::ClusterError;
    use parking_lot::Mutex;

    enum Answer {
        Instances(Vec<MemberInstance>),
        Unreachable,
    }

    /// A registration call seen by [`MockMembership`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RegistrationCall {
        /// [`MembershipClient::register`].
        Register(MemberInstance),
        /// [`MembershipClient::heartbeat`].
        Heartbeat(MemberInstance),
        /// [`MembershipClient::deregister`].
        Deregister(MemberInstance),
    }

    /// A membership client whose answer is set by the test.
    pub struct MockMembership {
        answer: Mutex<Answer>,
        queries: Mutex<Vec<(String, String)>>,
        registrations: Mutex<Vec<RegistrationCall>>,
    }

    impl Default for MockMembership {
        fn default() -> Self {
            Self {
                answer: Mutex::new(Answer::Instances(Vec::new())),
                queries: Mutex::new(Vec::new()),
                registrations: Mutex::new(Vec::new()),
            }
        }
    }

    impl MockMembership {
        /// Create a mock that reports no instances.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Report these instances on the next queries.
        pub fn set_instances(&self, instances: Vec<MemberInstance>) {
            *self.answer.lock() = Answer::Instances(instances);
        }

        /// Fail the next queries with a connectivity error.
        pub fn set_unreachable(&self) {
            *self.answer.lock() = Answer::Unreachable;
        }

        /// `(service_name, group)` of every query so far.
        #[must_use]
        pub fn queries(&self) -> Vec<(String, String)> {
            self.queries.lock().clone()
        }

        /// Every register, heartbeat and deregister call so far, in order.
        #[must_use]
        pub fn registrations(&self) -> Vec<RegistrationCall> {
            self.registrations.lock().clone()
        }

        fn record(&self, call: RegistrationCall) -> Result<()> {
            if matches!(*self.answer.lock(), Answer::Unreachable) {
                return Err(unreachable());
            }
            self.registrations.lock().push(call);
            Ok(())
        }
    }

    fn unreachable() -> ClusterError {
        ClusterError::Registry {
            status: 503,
            body: "registry unreachable".to_string(),
        }
    }

    #[async_trait]
    impl MembershipClient for MockMembership {
        async fn list_instances(
            &self,
            service_name: &str,
            group: &str,
        ) -> Result<Vec<MemberInstance>> {
            self.queries
                .lock()
                .push((service_name.to_string(), group.to_string()));

            match &*self.answer.lock() {
                Answer::Instances(instances) => Ok(instances.clone()),
                Answer::Unreachable => Err(unreachable()),
            }
        }

        async fn register(
            &self,
            _service_name: &str,
            _group: &str,
            instance: &MemberInstance,
        ) -> Result<()> {
            self.record(RegistrationCall::Register(instance.clone()))
        }

        async fn heartbeat(
            &self,
            _service_name: &str,
            _group: &str,
            instance: &MemberInstance,
        ) -> Result<()> {
            self.record(RegistrationCall::Heartbeat(instance.clone()))
        }

        async fn deregister(
            &self,
            _service_name: &str,
            _group: &str,
            instance: &MemberInstance,
        ) -> Result<()> {
            self.record(RegistrationCall::Deregister(instance.clone()))
        }

        fn backend_name(&self) -> &'static str {
            "mock"
        }
    }
}
