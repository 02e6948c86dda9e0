//! Secret access for user passwords, API key credentials and instance auth.

use crate::constants::FIELD_MANAGER;
use crate::store::StoreError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Value of `key` in Secret `namespace/name`; `None` when either is missing
    async fn get_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Create or replace the Secret with the given string data
    async fn put(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Delete the Secret; missing Secrets are not an error
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// `SecretStore` backed by the API server
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, StoreError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = secrets.get_opt(name).await? else {
            debug!("Secret {}/{} not found", namespace, name);
            return Ok(None);
        };
        let from_data = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned());
        let from_string_data = secret
            .string_data
            .as_ref()
            .and_then(|data| data.get(key))
            .cloned();
        Ok(from_data.or(from_string_data))
    }

    async fn put(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "labels": { "app.kubernetes.io/managed-by": FIELD_MANAGER },
            },
            "type": "Opaque",
            "stringData": data,
        });
        secrets
            .patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&secret))
            .await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match secrets.delete(name, &kube::api::DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }
}

/// In-memory `SecretStore`
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<BTreeMap<(String, String), BTreeMap<String, String>>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), BTreeMap<String, String>>> {
        self.secrets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Full data of a stored Secret
    #[must_use]
    pub fn data(&self, namespace: &str, name: &str) -> Option<BTreeMap<String, String>> {
        self.lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .data(namespace, name)
            .and_then(|data| data.get(key).cloned()))
    }

    async fn put(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        self.lock()
            .insert((namespace.to_string(), name.to_string()), data);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.lock()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}
