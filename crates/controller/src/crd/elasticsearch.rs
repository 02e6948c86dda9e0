//! # Elasticsearch Kinds
//!
//! Declared kinds applied to an Elasticsearch cluster. Every spec carries the
//! raw request body (`body`), an optional `targetInstance` and an optional
//! template reference list.

use crate::crd::managed::managed_resource;
use crate::crd::{ResourceStatus, Service, TargetInstance, TemplateSpec};
use serde::{Deserialize, Serialize};

/// Security role (`PUT /_security/role/{name}`)
///
/// # Example
///
/// ```yaml
/// apiVersion: es.eck.github.com/v1alpha1
/// kind: ElasticsearchRole
/// metadata:
///   name: logs-reader
/// spec:
///   body: |
///     {"indices": [{"names": ["logs-*"], "privileges": ["read"]}]}
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ElasticsearchRole",
    group = "es.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchRoleSpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// Native realm user (`PUT /_security/user/{name}`)
///
/// The password is read from `secretName` (key `password`) and injected into
/// the body before it is sent.
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ElasticsearchUser",
    group = "es.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchUserSpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    /// Secret holding the user's password under the `password` key
    pub secret_name: String,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// API key (`POST /_security/api_key`)
///
/// The key id is assigned by Elasticsearch and persisted in
/// `status.externalId`; the generated credentials are written to a Secret.
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ElasticsearchApikey",
    group = "es.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchApikeySpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    /// Secret receiving the generated key; defaults to the object name
    #[serde(default)]
    pub secret_name: Option<String>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// Composable index template (`PUT /_index_template/{name}`)
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "IndexTemplate",
    group = "es.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IndexTemplateSpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// Component template (`PUT /_component_template/{name}`)
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ComponentTemplate",
    group = "es.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ComponentTemplateSpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// Index lifecycle policy (`PUT /_ilm/policy/{name}`)
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "IndexLifecyclePolicy",
    group = "es.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IndexLifecyclePolicySpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// Snapshot lifecycle policy (`PUT /_slm/policy/{name}`)
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "SnapshotLifecyclePolicy",
    group = "es.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotLifecyclePolicySpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// Snapshot repository (`PUT /_snapshot/{name}`)
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "SnapshotRepository",
    group = "es.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRepositorySpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// Ingest pipeline (`PUT /_ingest/pipeline/{name}`)
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "IngestPipeline",
    group = "es.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IngestPipelineSpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

managed_resource!(ElasticsearchRole, Service::Elasticsearch);
managed_resource!(ElasticsearchUser, Service::Elasticsearch);
managed_resource!(ElasticsearchApikey, Service::Elasticsearch);
managed_resource!(IndexTemplate, Service::Elasticsearch);
managed_resource!(ComponentTemplate, Service::Elasticsearch);
managed_resource!(IndexLifecyclePolicy, Service::Elasticsearch);
managed_resource!(SnapshotLifecyclePolicy, Service::Elasticsearch);
managed_resource!(SnapshotRepository, Service::Elasticsearch);
managed_resource!(IngestPipeline, Service::Elasticsearch);
