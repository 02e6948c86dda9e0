//! # Common Spec Types
//!
//! Building blocks shared by every declared kind: the target instance pointer
//! and the template reference list.

use schemars::{json_schema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement,
};

/// Pointer to the external-service instance a declared object acts against
///
/// When absent on a declared object, the controller's default instance is used.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetInstance {
    /// Name of the ElasticsearchInstance / KibanaInstance object
    pub name: String,
    /// Namespace of the instance object; defaults to the declared object's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Template configuration of a declared object
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    /// ResourceTemplateData objects whose data is exposed to the body template
    #[serde(default)]
    pub references: Vec<TemplateReference>,
}

/// Reference to one or more ResourceTemplateData objects
///
/// Exactly one of `name` or `labelSelector` must be set. Without `namespace`
/// the lookup scope is decided by the kind's namespace policy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "label_selector_schema")]
    pub label_selector: Option<LabelSelector>,
}

/// What a template reference points at
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceTarget<'a> {
    ByName(&'a str),
    BySelector(&'a LabelSelector),
}

impl TemplateReference {
    /// Direct reference by name
    #[must_use]
    pub fn named(name: &str, namespace: Option<&str>) -> Self {
        Self {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            label_selector: None,
        }
    }

    /// Reference by label selector
    #[must_use]
    pub fn selector(selector: LabelSelector, namespace: Option<&str>) -> Self {
        Self {
            name: None,
            namespace: namespace.map(str::to_string),
            label_selector: Some(selector),
        }
    }

    /// Classify the reference; `None` when both or neither of name/selector are set
    #[must_use]
    pub fn target(&self) -> Option<ReferenceTarget<'_>> {
        match (self.name.as_deref(), self.label_selector.as_ref()) {
            (Some(name), None) if !name.is_empty() => Some(ReferenceTarget::ByName(name)),
            (None, Some(selector)) => Some(ReferenceTarget::BySelector(selector)),
            _ => None,
        }
    }
}

/// Schema of a `metav1.LabelSelector`
pub(crate) fn label_selector_schema(_gen: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "properties": {
            "matchLabels": {
                "type": "object",
                "additionalProperties": { "type": "string" }
            },
            "matchExpressions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["key", "operator"],
                    "properties": {
                        "key": { "type": "string" },
                        "operator": {
                            "type": "string",
                            "enum": ["In", "NotIn", "Exists", "DoesNotExist"]
                        },
                        "values": { "type": "array", "items": { "type": "string" } }
                    }
                }
            }
        }
    })
}

/// Open object schema for free-form data maps
pub(crate) fn preserve_unknown_object(_gen: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
