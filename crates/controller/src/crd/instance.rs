//! # Instance Kinds
//!
//! `ElasticsearchInstance` and `KibanaInstance` describe how to reach an
//! external service. Declared objects point at them through
//! `spec.targetInstance`.

use serde::{Deserialize, Serialize};

/// Connection settings shared by both instance kinds
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSettings {
    /// When false every external action against this instance is skipped
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base URL, e.g. `https://es-http.elastic:9200`
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<InstanceAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateRef>,
}

/// Credential sources; at most one should be set
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceAuthentication {
    /// Secret holding `username` and `password` keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_password_secret: Option<SecretKeyRef>,
    /// Secret holding an encoded API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_secret: Option<SecretKeyRef>,
}

/// Reference to a Secret in the instance's namespace
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub secret_name: String,
    /// Key within the Secret; kind-specific default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// CA certificate used to verify the instance's TLS endpoint
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRef {
    pub secret_name: String,
    /// Defaults to `ca.crt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[must_use]
pub fn default_true() -> bool {
    true
}

#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ElasticsearchInstance",
    group = "es.eck.github.com",
    version = "v1alpha1",
    namespaced,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".spec.url"}"#,
    printcolumn = r#"{"name":"Enabled", "type":"boolean", "jsonPath":".spec.enabled"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchInstanceSpec {
    #[serde(flatten)]
    pub settings: InstanceSettings,
}

#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "KibanaInstance",
    group = "kibana.eck.github.com",
    version = "v1alpha1",
    namespaced,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".spec.url"}"#,
    printcolumn = r#"{"name":"Enabled", "type":"boolean", "jsonPath":".spec.enabled"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KibanaInstanceSpec {
    #[serde(flatten)]
    pub settings: InstanceSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_enabled_defaults_to_true() {
        let spec: ElasticsearchInstanceSpec = serde_json::from_value(serde_json::json!({
            "url": "https://es:9200",
            "authentication": {"usernamePasswordSecret": {"secretName": "es-admin"}}
        }))
        .unwrap();
        assert!(spec.settings.enabled);
        assert_eq!(spec.settings.url, "https://es:9200");
        let auth = spec.settings.authentication.unwrap();
        assert_eq!(auth.username_password_secret.unwrap().secret_name, "es-admin");
        assert!(auth.api_key_secret.is_none());
    }
}
