//! Store adapter backed by the Kubernetes API.

use crate::crd::{LabelSelector, ManagedResource, ResourceStatus};
use crate::store::labels;
use crate::store::patch::{is_empty_patch, merge_diff};
use crate::store::{DeclaredObjectStore, ObjectStore, StoreError};
use async_trait::async_trait;
use kube::api::{ListParams, Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// `ObjectStore` over `kube::Api<K>`
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> std::fmt::Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K> Clone for KubeStore<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> KubeStore<K> {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Map API errors onto the store taxonomy
    fn classify(err: kube::Error, obj_ns: &str, obj_name: &str) -> StoreError {
        match err {
            kube::Error::Api(ref response) if response.code == 409 => StoreError::Conflict {
                kind: K::kind(&()).to_string(),
                namespace: obj_ns.to_string(),
                name: obj_name.to_string(),
            },
            kube::Error::Api(ref response) if response.code == 404 => StoreError::NotFound {
                kind: K::kind(&()).to_string(),
                namespace: obj_ns.to_string(),
                name: obj_name.to_string(),
            },
            other => StoreError::Kube(other),
        }
    }

    /// Merge-patch the finalizer list, guarded by resourceVersion
    async fn patch_finalizers(&self, obj: &K, finalizers: Vec<String>) -> Result<K, StoreError> {
        let (namespace, name) = identity(obj)?;
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": obj.meta().resource_version,
                "finalizers": finalizers,
            }
        });
        self.api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Self::classify(e, namespace, name))
    }
}

fn identity<K: Resource>(obj: &K) -> Result<(&str, &str), StoreError> {
    let namespace = obj
        .meta()
        .namespace
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject("object has no namespace".to_string()))?;
    let name = obj
        .meta()
        .name
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject("object has no name".to_string()))?;
    Ok((namespace, name))
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| Self::classify(e, namespace, name))
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<K>, StoreError> {
        let api: Api<K> = match namespace {
            Some(ns) => self.api(ns),
            None => Api::all(self.client.clone()),
        };
        let mut params = ListParams::default();
        if let Some(selector) = selector {
            params = params.labels_from(&labels::parse(selector)?);
        }
        let list = api.list(&params).await?;
        Ok(list.items)
    }
}

#[async_trait]
impl<K> DeclaredObjectStore<K> for KubeStore<K>
where
    K: ManagedResource,
{
    async fn add_finalizer(&self, obj: &K, token: &str) -> Result<K, StoreError> {
        let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
        if finalizers.iter().any(|f| f == token) {
            return Ok(obj.clone());
        }
        finalizers.push(token.to_string());
        self.patch_finalizers(obj, finalizers).await
    }

    async fn remove_finalizer(&self, obj: &K, token: &str) -> Result<K, StoreError> {
        let finalizers: Vec<String> = obj
            .meta()
            .finalizers
            .clone()
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != token)
            .collect();
        self.patch_finalizers(obj, finalizers).await
    }

    async fn patch_status(
        &self,
        obj: &K,
        base: Option<&ResourceStatus>,
        new: &ResourceStatus,
    ) -> Result<K, StoreError> {
        let (namespace, name) = identity(obj)?;
        let base_value = match base {
            Some(status) => serde_json::to_value(status)?,
            None => serde_json::json!({}),
        };
        let diff = merge_diff(&base_value, &serde_json::to_value(new)?);
        if base.is_some() && is_empty_patch(&diff) {
            debug!("Status of {}/{} unchanged, skipping patch", namespace, name);
            return Ok(obj.clone());
        }

        let patch = serde_json::json!({
            "metadata": { "resourceVersion": obj.meta().resource_version },
            "status": diff,
        });
        self.api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Self::classify(e, namespace, name))
    }
}
