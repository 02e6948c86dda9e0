//! # ResourceTemplateData
//!
//! Data objects publishing key/value data to body templates.

use crate::crd::common::preserve_unknown_object;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key/value data exposed to templates of declared objects
///
/// # Example
///
/// ```yaml
/// apiVersion: eck.github.com/v1alpha1
/// kind: ResourceTemplateData
/// metadata:
///   name: team-settings
///   labels:
///     team: a
/// spec:
///   data:
///     title: Team A
///     indices: '["logs-a-*", "metrics-a-*"]'
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ResourceTemplateData",
    group = "eck.github.com",
    version = "v1alpha1",
    namespaced,
    shortname = "rtd"
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateDataSpec {
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_object")]
    pub data: Map<String, Value>,
}

impl ResourceTemplateData {
    /// Data with string values holding JSON objects or arrays decoded
    #[must_use]
    pub fn decoded_data(&self) -> Map<String, Value> {
        self.spec
            .data
            .iter()
            .map(|(key, value)| (key.clone(), decode_value(value)))
            .collect()
    }
}

/// Decode a string holding a JSON object or array; anything else is kept as is
#[must_use]
pub fn decode_value(value: &Value) -> Value {
    let Value::String(text) = value else {
        return value.clone();
    };
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return value.clone();
    }
    match serde_json::from_str::<Value>(text) {
        Ok(decoded @ (Value::Object(_) | Value::Array(_))) => decoded,
        _ => value.clone(),
    }
}
