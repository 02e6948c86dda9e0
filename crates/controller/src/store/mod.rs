//! # Declared-Object Store
//!
//! Access to declared objects, data objects and Secrets.
//!
//! - `ObjectStore` - read access (`get`, `list`) for any namespaced kind
//! - `DeclaredObjectStore` - finalizer and status writes for declared kinds
//! - `SecretStore` - Secret values for user passwords and API key credentials
//!
//! Two implementations are provided: `KubeStore` talks to the API server,
//! `MemoryStore` keeps objects in process with the same optimistic concurrency
//! rules (used by tests and the offline CLI).

mod kube;
pub mod labels;
mod memory;
pub mod patch;
mod secrets;

pub use self::kube::KubeStore;
pub use memory::MemoryStore;
pub use secrets::{KubeSecretStore, MemorySecretStore, SecretStore};

use crate::crd::{LabelSelector, ManagedResource, ResourceStatus};
use async_trait::async_trait;

/// Errors raised by store adapters
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write was based on a stale resourceVersion
    #[error("conflict writing {kind} {namespace}/{name}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] ::kube::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid object: {0}")]
    InvalidObject(String),
}

impl StoreError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Read access to namespaced objects of kind `K`
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Fetch one object; `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    /// List objects in `namespace` (all namespaces when `None`) matching `selector`
    async fn list(
        &self,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<K>, StoreError>;
}

/// Writes the reconciliation engine performs on declared objects
///
/// Every write is guarded by the object's `resourceVersion`; a stale object
/// yields `StoreError::Conflict`.
#[async_trait]
pub trait DeclaredObjectStore<K: ManagedResource>: ObjectStore<K> {
    async fn add_finalizer(&self, obj: &K, token: &str) -> Result<K, StoreError>;

    async fn remove_finalizer(&self, obj: &K, token: &str) -> Result<K, StoreError>;

    /// Patch the status with the merge diff between `base` and `new`
    async fn patch_status(
        &self,
        obj: &K,
        base: Option<&ResourceStatus>,
        new: &ResourceStatus,
    ) -> Result<K, StoreError>;
}

/// `namespace/name` of an object, as used in logs and backoff keys
#[must_use]
pub fn object_key<K: ::kube::Resource>(obj: &K) -> String {
    format!(
        "{}/{}",
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default()
    )
}

/// Whether `obj` carries the finalizer `token`
#[must_use]
pub fn has_finalizer<K: ::kube::Resource>(obj: &K, token: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|t| t == token))
}
