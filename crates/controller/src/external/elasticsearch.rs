//! # Elasticsearch Clients
//!
//! REST schemes for the name-addressed Elasticsearch kinds, plus the two kinds
//! that need more than a path table: users (password read from a Secret) and
//! API keys (server-assigned id, credentials written to a Secret).

use crate::crd::{
    ComponentTemplate, ElasticsearchApikey, ElasticsearchRole, ElasticsearchUser,
    IndexLifecyclePolicy, IndexTemplate, IngestPipeline, ManagedResource, SnapshotLifecyclePolicy,
    SnapshotRepository,
};
use crate::external::rest::RestResource;
use crate::external::{
    Created, ExternalError, ExternalResource, HttpMethod, RecoveryStrategy, ServiceClient,
    UnresolvedIdentityPolicy,
};
use crate::store::SecretStore;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key holding the user password in `spec.secretName`
pub const PASSWORD_KEY: &str = "password";

/// Deletion attempts before an API key without a recorded id is released
pub const APIKEY_UNRESOLVED_DELETE_ATTEMPTS: u32 = 3;

#[must_use]
pub fn role() -> RestResource<ElasticsearchRole> {
    RestResource::put_by_name("ElasticsearchRole", |_, id| format!("/_security/role/{id}"))
}

#[must_use]
pub fn index_template() -> RestResource<IndexTemplate> {
    RestResource::put_by_name("IndexTemplate", |_, id| format!("/_index_template/{id}"))
}

#[must_use]
pub fn component_template() -> RestResource<ComponentTemplate> {
    RestResource::put_by_name("ComponentTemplate", |_, id| {
        format!("/_component_template/{id}")
    })
}

#[must_use]
pub fn index_lifecycle_policy() -> RestResource<IndexLifecyclePolicy> {
    RestResource::put_by_name("IndexLifecyclePolicy", |_, id| format!("/_ilm/policy/{id}"))
}

#[must_use]
pub fn snapshot_lifecycle_policy() -> RestResource<SnapshotLifecyclePolicy> {
    RestResource::put_by_name("SnapshotLifecyclePolicy", |_, id| {
        format!("/_slm/policy/{id}")
    })
}

#[must_use]
pub fn snapshot_repository() -> RestResource<SnapshotRepository> {
    RestResource::put_by_name("SnapshotRepository", |_, id| format!("/_snapshot/{id}"))
}

#[must_use]
pub fn ingest_pipeline() -> RestResource<IngestPipeline> {
    RestResource::put_by_name("IngestPipeline", |_, id| format!("/_ingest/pipeline/{id}"))
}

fn namespace_of<K: ManagedResource>(obj: &K) -> Result<&str, ExternalError> {
    obj.meta()
        .namespace
        .as_deref()
        .ok_or_else(|| ExternalError::Configuration("object has no namespace".to_string()))
}

/// Native realm users; the password comes from `spec.secretName`
pub struct UserResource {
    secrets: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for UserResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserResource").finish_non_exhaustive()
    }
}

impl UserResource {
    #[must_use]
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { secrets }
    }

    /// Rendered body with the password from the user's Secret injected
    async fn body_with_password(
        &self,
        user: &ElasticsearchUser,
        body: &Value,
    ) -> Result<Value, ExternalError> {
        let namespace = namespace_of(user)?;
        let password = self
            .secrets
            .get_value(namespace, &user.spec.secret_name, PASSWORD_KEY)
            .await?
            .ok_or_else(|| {
                ExternalError::Configuration(format!(
                    "Secret {namespace}/{} has no '{PASSWORD_KEY}' key",
                    user.spec.secret_name
                ))
            })?;
        let mut body = match body {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        body.insert(PASSWORD_KEY.to_string(), Value::String(password));
        Ok(Value::Object(body))
    }

    fn path(id: &str) -> String {
        format!("/_security/user/{id}")
    }
}

#[async_trait]
impl ExternalResource<ElasticsearchUser> for UserResource {
    async fn exists(
        &self,
        client: &ServiceClient,
        _: &ElasticsearchUser,
        id: &str,
    ) -> Result<bool, ExternalError> {
        match client.request(HttpMethod::Get, &Self::path(id), None).await {
            Ok(_) => Ok(true),
            Err(ExternalError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create(
        &self,
        client: &ServiceClient,
        user: &ElasticsearchUser,
        body: &Value,
    ) -> Result<Created, ExternalError> {
        let id = user.metadata.name.clone().unwrap_or_default();
        let body = self.body_with_password(user, body).await?;
        let raw = client
            .request(HttpMethod::Put, &Self::path(&id), Some(&body))
            .await?;
        Ok(Created {
            external_id: id,
            raw,
        })
    }

    async fn update(
        &self,
        client: &ServiceClient,
        user: &ElasticsearchUser,
        id: &str,
        body: &Value,
    ) -> Result<(), ExternalError> {
        let body = self.body_with_password(user, body).await?;
        client
            .request(HttpMethod::Put, &Self::path(id), Some(&body))
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        client: &ServiceClient,
        _: &ElasticsearchUser,
        id: &str,
    ) -> Result<(), ExternalError> {
        client
            .request(HttpMethod::Delete, &Self::path(id), None)
            .await?;
        Ok(())
    }
}

/// Fields the update API key endpoint accepts
const APIKEY_UPDATABLE_FIELDS: [&str; 3] = ["role_descriptors", "metadata", "expiration"];

/// API keys
///
/// The id is assigned by Elasticsearch on creation and recorded in
/// `status.externalId`. The generated credentials (`id`, `name`, `api_key`,
/// `encoded`) are written to `spec.secretName` (the object name by default).
pub struct ApiKeyResource {
    secrets: Arc<dyn SecretStore>,
    recovery: RecoveryStrategy,
}

impl std::fmt::Debug for ApiKeyResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyResource")
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl ApiKeyResource {
    #[must_use]
    pub fn new(secrets: Arc<dyn SecretStore>, recovery: RecoveryStrategy) -> Self {
        Self { secrets, recovery }
    }

    fn secret_name(key: &ElasticsearchApikey) -> String {
        key.spec
            .secret_name
            .clone()
            .unwrap_or_else(|| key.metadata.name.clone().unwrap_or_default())
    }

    async fn invalidate(client: &ServiceClient, id: &str) -> Result<Value, ExternalError> {
        client
            .request(
                HttpMethod::Delete,
                "/_security/api_key",
                Some(&serde_json::json!({ "ids": [id] })),
            )
            .await
    }
}

#[async_trait]
impl ExternalResource<ElasticsearchApikey> for ApiKeyResource {
    fn identity(&self, key: &ElasticsearchApikey) -> Option<String> {
        key.status
            .as_ref()
            .and_then(|s| s.external_id.clone())
            .filter(|id| !id.is_empty())
    }

    fn recovery(&self) -> RecoveryStrategy {
        self.recovery
    }

    fn unresolved_identity(&self) -> UnresolvedIdentityPolicy {
        UnresolvedIdentityPolicy::ReleaseAfter(APIKEY_UNRESOLVED_DELETE_ATTEMPTS)
    }

    async fn exists(
        &self,
        client: &ServiceClient,
        _: &ElasticsearchApikey,
        id: &str,
    ) -> Result<bool, ExternalError> {
        let response = match client
            .request(HttpMethod::Get, &format!("/_security/api_key?id={id}"), None)
            .await
        {
            Ok(response) => response,
            Err(ExternalError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let active = response
            .get("api_keys")
            .and_then(Value::as_array)
            .is_some_and(|keys| {
                keys.iter().any(|k| {
                    k.get("id").and_then(Value::as_str) == Some(id)
                        && !k.get("invalidated").and_then(Value::as_bool).unwrap_or(false)
                })
            });
        Ok(active)
    }

    async fn create(
        &self,
        client: &ServiceClient,
        key: &ElasticsearchApikey,
        body: &Value,
    ) -> Result<Created, ExternalError> {
        let namespace = namespace_of(key)?;
        let mut request = match body {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        request
            .entry("name")
            .or_insert_with(|| Value::String(key.metadata.name.clone().unwrap_or_default()));
        let request = Value::Object(request);

        let raw = client
            .request(HttpMethod::Post, "/_security/api_key", Some(&request))
            .await?;
        let external_id = raw
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ExternalError::Transient("create API key response carries no id".to_string())
            })?
            .to_string();

        let mut credentials = BTreeMap::new();
        for field in ["id", "name", "api_key", "encoded"] {
            if let Some(value) = raw.get(field).and_then(Value::as_str) {
                credentials.insert(field.to_string(), value.to_string());
            }
        }
        let secret_name = Self::secret_name(key);
        if let Err(e) = self.secrets.put(namespace, &secret_name, credentials).await {
            warn!(
                "Created API key {} but could not write Secret {}/{}: {}",
                external_id, namespace, secret_name, e
            );
            return Err(ExternalError::Incomplete {
                external_id,
                reason: format!("writing Secret {namespace}/{secret_name} failed: {e}"),
            });
        }
        info!(
            "Created API key {} and stored credentials in Secret {}/{}",
            external_id, namespace, secret_name
        );

        Ok(Created { external_id, raw })
    }

    /// Update the key's mutable fields
    ///
    /// The secret value of a key is only returned on creation. When the
    /// Secret does not hold this key's credentials, the key is invalidated and
    /// reported missing so a fresh one is created.
    async fn update(
        &self,
        client: &ServiceClient,
        key: &ElasticsearchApikey,
        id: &str,
        body: &Value,
    ) -> Result<(), ExternalError> {
        let namespace = namespace_of(key)?;
        let secret_name = Self::secret_name(key);
        let stored = self.secrets.get_value(namespace, &secret_name, "id").await?;
        if stored.as_deref() != Some(id) {
            warn!(
                "Secret {}/{} does not hold the credentials of API key {}, invalidating it",
                namespace, secret_name, id
            );
            match Self::invalidate(client, id).await {
                Ok(_) | Err(ExternalError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            return Err(ExternalError::NotFound(format!(
                "credentials of API key {id} are not stored"
            )));
        }

        let request: Map<String, Value> = body
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(field, _)| APIKEY_UPDATABLE_FIELDS.contains(&field.as_str()))
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        client
            .request(
                HttpMethod::Put,
                &format!("/_security/api_key/{id}"),
                Some(&Value::Object(request)),
            )
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        client: &ServiceClient,
        key: &ElasticsearchApikey,
        id: &str,
    ) -> Result<(), ExternalError> {
        let result = Self::invalidate(client, id).await;
        if result.is_ok() || matches!(result, Err(ExternalError::NotFound(_))) {
            let namespace = namespace_of(key)?;
            let secret_name = Self::secret_name(key);
            debug!("Removing API key Secret {}/{}", namespace, secret_name);
            self.secrets.delete(namespace, &secret_name).await?;
        }
        result.map(|_| ())
    }
}
