//! # Target Instance Resolution
//!
//! Maps a declared object's `spec.targetInstance` to the service instance it
//! acts against. Objects without a target use the process-wide default
//! instance configured through the environment.

use crate::crd::{
    ElasticsearchInstance, InstanceAuthentication, InstanceSettings, KibanaInstance, SecretKeyRef,
    Service, TargetInstance,
};
use crate::external::{Credentials, ExternalError, ServiceClient};
use crate::store::{ObjectStore, SecretStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const USERNAME_KEY: &str = "username";
const PASSWORD_KEY: &str = "password";
const API_KEY_KEY: &str = "apiKey";
const CA_CERT_KEY: &str = "ca.crt";

/// Default instance settings for one service
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DefaultInstance {
    pub enabled: bool,
    pub url: String,
    /// Namespace the credential and CA Secrets live in
    pub namespace: String,
    /// Secret with `username`/`password` (or `apiKey`) keys
    pub credentials_secret: Option<String>,
    /// Secret with a `ca.crt` key
    pub ca_secret: Option<String>,
}

/// A target instance with everything needed to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstance {
    /// `namespace/name` of the instance object, or `default`
    pub key: String,
    pub enabled: bool,
    pub url: String,
    pub credentials: Option<Credentials>,
    pub ca_certificate: Option<Vec<u8>>,
}

impl ResolvedInstance {
    /// Client for this instance
    pub fn client(&self) -> Result<ServiceClient, ExternalError> {
        ServiceClient::new(
            &self.url,
            self.credentials.clone(),
            self.ca_certificate.as_deref(),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("Secret {namespace}/{name} is missing key '{key}'")]
    MissingSecretKey {
        namespace: String,
        name: String,
        key: String,
    },
    #[error("failed to read instance: {0}")]
    Store(#[from] StoreError),
}

/// `namespace/name` an object's target resolves to; `default` without a target
#[must_use]
pub fn target_key(target: Option<&TargetInstance>, namespace: &str) -> String {
    match target {
        Some(target) => format!(
            "{}/{}",
            target.namespace.as_deref().unwrap_or(namespace),
            target.name
        ),
        None => "default".to_string(),
    }
}

#[async_trait]
pub trait InstanceResolver: Send + Sync {
    /// Resolve the instance targeted from an object in `namespace`
    async fn resolve(
        &self,
        service: Service,
        target: Option<&TargetInstance>,
        namespace: &str,
    ) -> Result<ResolvedInstance, InstanceError>;
}

/// Resolver reading instance objects and Secrets through the stores
pub struct StoreInstanceResolver {
    elasticsearch: Arc<dyn ObjectStore<ElasticsearchInstance>>,
    kibana: Arc<dyn ObjectStore<KibanaInstance>>,
    secrets: Arc<dyn SecretStore>,
    default_elasticsearch: DefaultInstance,
    default_kibana: DefaultInstance,
}

impl std::fmt::Debug for StoreInstanceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreInstanceResolver")
            .field("default_elasticsearch", &self.default_elasticsearch)
            .field("default_kibana", &self.default_kibana)
            .finish_non_exhaustive()
    }
}

impl StoreInstanceResolver {
    #[must_use]
    pub fn new(
        elasticsearch: Arc<dyn ObjectStore<ElasticsearchInstance>>,
        kibana: Arc<dyn ObjectStore<KibanaInstance>>,
        secrets: Arc<dyn SecretStore>,
        default_elasticsearch: DefaultInstance,
        default_kibana: DefaultInstance,
    ) -> Self {
        Self {
            elasticsearch,
            kibana,
            secrets,
            default_elasticsearch,
            default_kibana,
        }
    }

    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<String, InstanceError> {
        self.secrets
            .get_value(namespace, name, key)
            .await?
            .ok_or_else(|| InstanceError::MissingSecretKey {
                namespace: namespace.to_string(),
                name: name.to_string(),
                key: key.to_string(),
            })
    }

    async fn credentials(
        &self,
        namespace: &str,
        auth: Option<&InstanceAuthentication>,
    ) -> Result<Option<Credentials>, InstanceError> {
        let Some(auth) = auth else {
            return Ok(None);
        };
        if let Some(SecretKeyRef { secret_name, key }) = auth.api_key_secret.as_ref() {
            let api_key = self
                .secret_value(namespace, secret_name, key.as_deref().unwrap_or(API_KEY_KEY))
                .await?;
            return Ok(Some(Credentials::ApiKey(api_key)));
        }
        if let Some(SecretKeyRef { secret_name, key }) = auth.username_password_secret.as_ref() {
            return self
                .basic_credentials(namespace, secret_name, key.as_deref().unwrap_or(PASSWORD_KEY))
                .await
                .map(Some);
        }
        Ok(None)
    }

    async fn basic_credentials(
        &self,
        namespace: &str,
        secret_name: &str,
        password_key: &str,
    ) -> Result<Credentials, InstanceError> {
        Ok(Credentials::Basic {
            username: self.secret_value(namespace, secret_name, USERNAME_KEY).await?,
            password: self.secret_value(namespace, secret_name, password_key).await?,
        })
    }

    async fn from_settings(
        &self,
        key: String,
        namespace: &str,
        settings: &InstanceSettings,
    ) -> Result<ResolvedInstance, InstanceError> {
        if !settings.enabled {
            return Ok(ResolvedInstance {
                key,
                enabled: false,
                url: settings.url.clone(),
                credentials: None,
                ca_certificate: None,
            });
        }
        let credentials = self
            .credentials(namespace, settings.authentication.as_ref())
            .await?;
        let ca_certificate = match settings.certificate.as_ref() {
            Some(cert) => Some(
                self.secret_value(
                    namespace,
                    &cert.secret_name,
                    cert.key.as_deref().unwrap_or(CA_CERT_KEY),
                )
                .await?
                .into_bytes(),
            ),
            None => None,
        };
        Ok(ResolvedInstance {
            key,
            enabled: true,
            url: settings.url.clone(),
            credentials,
            ca_certificate,
        })
    }

    async fn from_default(
        &self,
        defaults: &DefaultInstance,
    ) -> Result<ResolvedInstance, InstanceError> {
        let mut resolved = ResolvedInstance {
            key: "default".to_string(),
            enabled: defaults.enabled,
            url: defaults.url.clone(),
            credentials: None,
            ca_certificate: None,
        };
        if !defaults.enabled {
            return Ok(resolved);
        }
        if let Some(secret) = defaults.credentials_secret.as_deref() {
            let api_key = self
                .secrets
                .get_value(&defaults.namespace, secret, API_KEY_KEY)
                .await?;
            resolved.credentials = Some(match api_key {
                Some(api_key) => Credentials::ApiKey(api_key),
                None => {
                    self.basic_credentials(&defaults.namespace, secret, PASSWORD_KEY)
                        .await?
                }
            });
        }
        if let Some(secret) = defaults.ca_secret.as_deref() {
            resolved.ca_certificate = Some(
                self.secret_value(&defaults.namespace, secret, CA_CERT_KEY)
                    .await?
                    .into_bytes(),
            );
        }
        Ok(resolved)
    }
}

#[async_trait]
impl InstanceResolver for StoreInstanceResolver {
    async fn resolve(
        &self,
        service: Service,
        target: Option<&TargetInstance>,
        namespace: &str,
    ) -> Result<ResolvedInstance, InstanceError> {
        let Some(target) = target else {
            return match service {
                Service::Elasticsearch => self.from_default(&self.default_elasticsearch).await,
                Service::Kibana => self.from_default(&self.default_kibana).await,
            };
        };

        let instance_namespace = target.namespace.as_deref().unwrap_or(namespace);
        let key = target_key(Some(target), namespace);
        debug!("Resolving {} instance {}", service.as_str(), key);

        let not_found = |kind| InstanceError::NotFound {
            kind,
            namespace: instance_namespace.to_string(),
            name: target.name.clone(),
        };
        let settings = match service {
            Service::Elasticsearch => self
                .elasticsearch
                .get(instance_namespace, &target.name)
                .await?
                .map(|i| i.spec.settings)
                .ok_or_else(|| not_found("ElasticsearchInstance"))?,
            Service::Kibana => self
                .kibana
                .get(instance_namespace, &target.name)
                .await?
                .map(|i| i.spec.settings)
                .ok_or_else(|| not_found("KibanaInstance"))?,
        };
        self.from_settings(key, instance_namespace, &settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ElasticsearchInstanceSpec, KibanaInstanceSpec};
    use crate::store::{MemorySecretStore, MemoryStore};
    use std::collections::BTreeMap;

    fn resolver(
        es: Arc<MemoryStore<ElasticsearchInstance>>,
        secrets: Arc<MemorySecretStore>,
    ) -> StoreInstanceResolver {
        StoreInstanceResolver::new(
            es,
            Arc::new(MemoryStore::<KibanaInstance>::new()),
            secrets,
            DefaultInstance {
                enabled: true,
                url: "https://es-default:9200".to_string(),
                namespace: "eck-system".to_string(),
                credentials_secret: Some("es-admin".to_string()),
                ca_secret: None,
            },
            DefaultInstance::default(),
        )
    }

    #[tokio::test]
    async fn test_default_instance_basic_auth() {
        let secrets = Arc::new(MemorySecretStore::new());
        secrets
            .put(
                "eck-system",
                "es-admin",
                BTreeMap::from([
                    ("username".to_string(), "elastic".to_string()),
                    ("password".to_string(), "changeme".to_string()),
                ]),
            )
            .await
            .unwrap();
        let resolver = resolver(Arc::new(MemoryStore::new()), secrets);

        let resolved = resolver
            .resolve(Service::Elasticsearch, None, "team-a")
            .await
            .unwrap();
        assert_eq!(resolved.key, "default");
        assert!(resolved.enabled);
        assert_eq!(
            resolved.credentials,
            Some(Credentials::Basic {
                username: "elastic".to_string(),
                password: "changeme".to_string()
            })
        );

        let kibana = resolver.resolve(Service::Kibana, None, "team-a").await.unwrap();
        assert!(!kibana.enabled);
    }

    #[tokio::test]
    async fn test_target_instance_in_own_namespace() {
        let store = Arc::new(MemoryStore::new());
        let mut instance = ElasticsearchInstance::new(
            "logging",
            ElasticsearchInstanceSpec {
                settings: InstanceSettings {
                    enabled: false,
                    url: "https://logging:9200".to_string(),
                    authentication: None,
                    certificate: None,
                },
            },
        );
        instance.metadata.namespace = Some("team-a".to_string());
        store.insert(instance).unwrap();
        let resolver = resolver(Arc::clone(&store), Arc::new(MemorySecretStore::new()));

        let target = TargetInstance {
            name: "logging".to_string(),
            namespace: None,
        };
        let resolved = resolver
            .resolve(Service::Elasticsearch, Some(&target), "team-a")
            .await
            .unwrap();
        assert_eq!(resolved.key, "team-a/logging");
        assert!(!resolved.enabled);

        let missing = resolver
            .resolve(Service::Elasticsearch, Some(&target), "team-b")
            .await;
        assert!(matches!(missing, Err(InstanceError::NotFound { .. })));
    }

    #[test]
    fn test_kibana_instance_spec_shape() {
        let spec: KibanaInstanceSpec = serde_json::from_value(serde_json::json!({
            "url": "https://kb:5601",
            "enabled": false
        }))
        .unwrap();
        assert!(!spec.settings.enabled);
    }
}
