//! # Kibana Kinds
//!
//! Declared kinds applied to a Kibana instance.

use crate::crd::managed::managed_resource;
use crate::crd::{ResourceStatus, Service, TargetInstance, TemplateSpec};
use serde::{Deserialize, Serialize};

/// Kibana role (`PUT /api/security/role/{name}`)
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "KibanaRole",
    group = "kibana.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KibanaRoleSpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// Kibana space
///
/// Created with `POST /api/spaces/space`; updated with
/// `PUT /api/spaces/space/{name}`. The object name is the space id.
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Space",
    group = "kibana.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SpaceSpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// Saved object types handled by [`SavedObject`]
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
pub enum SavedObjectType {
    #[serde(rename = "dashboard")]
    Dashboard,
    #[serde(rename = "visualization")]
    Visualization,
    #[serde(rename = "search")]
    Search,
    #[serde(rename = "lens")]
    Lens,
    #[serde(rename = "index-pattern")]
    IndexPattern,
}

impl SavedObjectType {
    /// Path segment used by the saved objects API
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SavedObjectType::Dashboard => "dashboard",
            SavedObjectType::Visualization => "visualization",
            SavedObjectType::Search => "search",
            SavedObjectType::Lens => "lens",
            SavedObjectType::IndexPattern => "index-pattern",
        }
    }
}

/// Saved object (`/s/{space}/api/saved_objects/{type}/{name}`)
///
/// # Example
///
/// ```yaml
/// apiVersion: kibana.eck.github.com/v1alpha1
/// kind: SavedObject
/// metadata:
///   name: team-overview
/// spec:
///   objectType: dashboard
///   space: team-a
///   body: |
///     {"attributes": {"title": "{{ .Values.teamSettings.title }}"}}
///   template:
///     references:
///       - name: team-settings
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "SavedObject",
    group = "kibana.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.objectType"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SavedObjectSpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    pub object_type: SavedObjectType,
    /// Space the object lives in; the default space when absent
    #[serde(default)]
    pub space: Option<String>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

/// Data view (`/s/{space}/api/data_views/data_view/{name}`)
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "DataView",
    group = "kibana.eck.github.com",
    version = "v1alpha1",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DataViewSpec {
    #[serde(default)]
    pub target_instance: Option<TargetInstance>,
    #[serde(default)]
    pub space: Option<String>,
    pub body: String,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

managed_resource!(KibanaRole, Service::Kibana);
managed_resource!(Space, Service::Kibana);
managed_resource!(SavedObject, Service::Kibana);
managed_resource!(DataView, Service::Kibana);

/// Space-scoped path prefix (`""` for the default space)
#[must_use]
pub fn space_prefix(space: Option<&str>) -> String {
    match space {
        Some(space) if !space.is_empty() && space != "default" => format!("/s/{space}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_prefix_default_space() {
        assert_eq!(space_prefix(None), "");
        assert_eq!(space_prefix(Some("default")), "");
        assert_eq!(space_prefix(Some("team-a")), "/s/team-a");
    }

    #[test]
    fn test_saved_object_spec_deserializes_type() {
        let spec: SavedObjectSpec = serde_json::from_value(serde_json::json!({
            "objectType": "index-pattern",
            "body": "{}"
        }))
        .unwrap();
        assert_eq!(spec.object_type, SavedObjectType::IndexPattern);
        assert!(spec.space.is_none());
        assert!(spec.template.is_none());
    }
}
