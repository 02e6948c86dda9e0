//! # External Resources
//!
//! Per-kind clients for the resources the controller manages in
//! Elasticsearch and Kibana.
//!
//! - `http.rs` - `ServiceClient`, the shared HTTP transport
//! - `rest.rs` - `RestResource`, a table-driven client for name-addressed kinds
//! - `elasticsearch.rs` / `kibana.rs` - per-kind schemes, users, API keys
//! - `instance.rs` - resolving `targetInstance` into a connected client

pub mod elasticsearch;
pub mod http;
pub mod instance;
pub mod kibana;
pub mod rest;

pub use http::{Credentials, HttpMethod, ServiceClient};
pub use instance::{
    DefaultInstance, InstanceError, InstanceResolver, ResolvedInstance, StoreInstanceResolver,
};
pub use rest::RestResource;

use crate::crd::ManagedResource;
use crate::store::StoreError;
use async_trait::async_trait;
use serde_json::Value;

/// Errors raised by external clients
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    /// The resource does not exist on the service
    #[error("not found: {0}")]
    NotFound(String),
    /// Network failure, timeout, throttling or 5xx; worth retrying
    #[error("transient failure: {0}")]
    Transient(String),
    /// The service refused the request (4xx)
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    /// Client or instance configuration problem
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A Secret the request depends on could not be read or written
    #[error("secret error: {0}")]
    Secret(#[from] StoreError),
    /// The resource was created but a follow-up step failed
    #[error("created {external_id} but {reason}")]
    Incomplete { external_id: String, reason: String },
}

impl ExternalError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExternalError::NotFound(_))
    }

    /// Identity of a resource that exists despite the error
    #[must_use]
    pub fn created_identity(&self) -> Option<&str> {
        match self {
            ExternalError::Incomplete { external_id, .. } => Some(external_id),
            _ => None,
        }
    }
}

/// What the service returned when a resource was created
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// Identity to persist in `status.externalId`
    pub external_id: String,
    /// Raw response body
    pub raw: Value,
}

/// How a kind recovers from a previously failed apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryStrategy {
    /// Update when the resource exists, create it otherwise
    #[default]
    Repair,
    /// Delete the old identity (if any) and create a fresh resource
    Recreate,
}

impl std::str::FromStr for RecoveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Repair" => Ok(RecoveryStrategy::Repair),
            "Recreate" => Ok(RecoveryStrategy::Recreate),
            other => Err(format!(
                "unknown recovery strategy '{other}', expected Repair or Recreate"
            )),
        }
    }
}

/// Deletion behaviour when the external identity is unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedIdentityPolicy {
    /// Keep the finalizer and report an error until an identity appears
    #[default]
    Hold,
    /// Release the finalizer after this many attempts
    ReleaseAfter(u32),
}

/// Client for one declared kind's external resources
///
/// `id` is always the value returned by [`ExternalResource::identity`] or by a
/// previous [`ExternalResource::create`].
#[async_trait]
pub trait ExternalResource<K: ManagedResource>: Send + Sync {
    /// Identity of the external resource; `None` when it cannot be derived
    ///
    /// Name-addressed kinds use the object name; server-identified kinds use
    /// `status.externalId`.
    fn identity(&self, obj: &K) -> Option<String> {
        obj.meta().name.clone()
    }

    fn recovery(&self) -> RecoveryStrategy {
        RecoveryStrategy::Repair
    }

    fn unresolved_identity(&self) -> UnresolvedIdentityPolicy {
        UnresolvedIdentityPolicy::Hold
    }

    async fn exists(&self, client: &ServiceClient, obj: &K, id: &str)
        -> Result<bool, ExternalError>;

    async fn create(
        &self,
        client: &ServiceClient,
        obj: &K,
        body: &Value,
    ) -> Result<Created, ExternalError>;

    async fn update(
        &self,
        client: &ServiceClient,
        obj: &K,
        id: &str,
        body: &Value,
    ) -> Result<(), ExternalError>;

    async fn delete(&self, client: &ServiceClient, obj: &K, id: &str)
        -> Result<(), ExternalError>;
}
