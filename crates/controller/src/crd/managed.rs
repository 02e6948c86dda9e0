//! # Managed Resource Trait
//!
//! The view of a declared object the reconciliation engine works with. Every
//! declared kind implements it through `managed_resource!`.

use crate::crd::{ResourceStatus, TargetInstance, TemplateReference};
use kube::core::NamespaceResourceScope;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// External service family a declared kind is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Elasticsearch,
    Kibana,
}

impl Service {
    /// Finalizer token owned by the controller for kinds of this service
    #[must_use]
    pub fn finalizer(self) -> &'static str {
        match self {
            Service::Elasticsearch => "es.eck.github.com/finalizer",
            Service::Kibana => "kibana.eck.github.com/finalizer",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Service::Elasticsearch => "elasticsearch",
            Service::Kibana => "kibana",
        }
    }
}

/// A declared object kind reconciled by the generic engine
pub trait ManagedResource:
    kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Service the kind's external resources live in
    const SERVICE: Service;

    fn target_instance(&self) -> Option<&TargetInstance>;

    /// Request body template (JSON text, possibly containing template actions)
    fn body_template(&self) -> &str;

    fn references(&self) -> &[TemplateReference];

    fn resource_status(&self) -> Option<&ResourceStatus>;

    fn resource_status_mut(&mut self) -> &mut Option<ResourceStatus>;

    /// Kind name as registered with the API server
    #[must_use]
    fn kind_name() -> String {
        Self::kind(&()).to_string()
    }
}

/// Implements [`ManagedResource`] for a kube-derived kind whose spec carries
/// `target_instance`, `body` and `template` fields.
macro_rules! managed_resource {
    ($kind:ty, $service:expr) => {
        impl $crate::crd::ManagedResource for $kind {
            const SERVICE: $crate::crd::Service = $service;

            fn target_instance(&self) -> Option<&$crate::crd::TargetInstance> {
                self.spec.target_instance.as_ref()
            }

            fn body_template(&self) -> &str {
                &self.spec.body
            }

            fn references(&self) -> &[$crate::crd::TemplateReference] {
                self.spec
                    .template
                    .as_ref()
                    .map_or(&[], |t| t.references.as_slice())
            }

            fn resource_status(&self) -> Option<&$crate::crd::ResourceStatus> {
                self.status.as_ref()
            }

            fn resource_status_mut(&mut self) -> &mut Option<$crate::crd::ResourceStatus> {
                &mut self.status
            }
        }
    };
}

pub(crate) use managed_resource;
