//! # Body Renderer
//!
//! Renders a declared object's body template against the data objects its
//! references resolved to.
//!
//! The data is exposed as a value tree rooted at `Values`:
//!
//! ```text
//! Values.<namespaceId>.<nameId>.<key>   every data object
//! Values.<nameId>.<key>                 data objects in the declaring namespace
//! ```
//!
//! Identifiers are normalized with [`identifier`]. When a shortcut entry would
//! collide with a namespace entry, the namespace entry wins.

use crate::crd::ResourceTemplateData;
use crate::template::dialect::{translate, DialectError};
use crate::template::helpers;
use crate::template::normalize::identifier;
use handlebars::Handlebars;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template syntax error: {0}")]
    Syntax(#[from] DialectError),
    #[error("template rendering failed: {0}")]
    Template(String),
}

/// Handlebars-backed renderer in strict mode without HTML escaping
#[derive(Debug)]
pub struct BodyRenderer {
    registry: Handlebars<'static>,
}

impl Default for BodyRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyRenderer {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        helpers::register(&mut registry);
        Self { registry }
    }

    /// Render `template` against `data`
    ///
    /// `own_namespace` is the declaring object's namespace and selects which
    /// data objects also get a shortcut entry. Templates without actions are
    /// returned verbatim.
    pub fn render(
        &self,
        template: &str,
        data: &[ResourceTemplateData],
        own_namespace: &str,
    ) -> Result<String, RenderError> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }
        let translated = translate(template)?;
        let context = serde_json::json!({ "Values": build_values(data, own_namespace) });
        self.registry
            .render_template(&translated, &context)
            .map_err(|e| RenderError::Template(e.to_string()))
    }
}

/// Build the `Values` tree for `data`
///
/// Data objects are taken in order; when two objects normalize to the same
/// identifiers the first one wins.
#[must_use]
pub fn build_values(data: &[ResourceTemplateData], own_namespace: &str) -> Value {
    let mut tree: Map<String, Value> = Map::new();
    let mut shortcuts: Vec<(String, Value)> = Vec::new();

    for object in data {
        let namespace = object.metadata.namespace.as_deref().unwrap_or_default();
        let name = object.metadata.name.as_deref().unwrap_or_default();
        let values = Value::Object(object.decoded_data());

        let namespace_entry = tree
            .entry(identifier(namespace))
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(by_name) = namespace_entry {
            by_name.entry(identifier(name)).or_insert_with(|| values.clone());
        }
        if namespace == own_namespace {
            shortcuts.push((identifier(name), values));
        }
    }

    let namespace_ids: Vec<String> = tree.keys().cloned().collect();
    for (name_id, values) in shortcuts {
        if namespace_ids.contains(&name_id) {
            continue;
        }
        tree.entry(name_id).or_insert(values);
    }
    Value::Object(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ResourceTemplateDataSpec;
    use serde_json::json;

    fn data(namespace: &str, name: &str, values: Value) -> ResourceTemplateData {
        let mut object = ResourceTemplateData::new(
            name,
            ResourceTemplateDataSpec {
                data: values.as_object().cloned().unwrap_or_default(),
            },
        );
        object.metadata.namespace = Some(namespace.to_string());
        object
    }

    #[test]
    fn test_build_values_namespace_and_shortcut_entries() {
        let values = build_values(
            &[
                data("team-a", "shared-settings", json!({"title": "A"})),
                data("platform", "defaults", json!({"replicas": 2})),
            ],
            "team-a",
        );
        assert_eq!(values["teamA"]["sharedSettings"]["title"], json!("A"));
        assert_eq!(values["sharedSettings"]["title"], json!("A"));
        assert_eq!(values["platform"]["defaults"]["replicas"], json!(2));
        assert!(values.get("defaults").is_none());
    }

    #[test]
    fn test_build_values_namespace_wins_over_shortcut() {
        let values = build_values(
            &[
                data("team-a", "platform", json!({"k": "shortcut"})),
                data("platform", "x", json!({"k": "namespaced"})),
            ],
            "team-a",
        );
        assert_eq!(values["platform"]["x"]["k"], json!("namespaced"));
        assert!(values["platform"].get("k").is_none());
    }

    #[test]
    fn test_render_without_actions_is_verbatim() {
        let renderer = BodyRenderer::new();
        let body = r#"{"cluster": ["all"], "indices": []}"#;
        assert_eq!(renderer.render(body, &[], "ns").unwrap(), body);
    }

    #[test]
    fn test_render_strict_mode_rejects_missing_field() {
        let renderer = BodyRenderer::new();
        let err = renderer
            .render(r#"{"a": "{{ .Values.nothing.here }}"}"#, &[], "ns")
            .unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }

    #[test]
    fn test_render_decodes_json_strings_and_does_not_escape() {
        let renderer = BodyRenderer::new();
        let objects = [data(
            "ns",
            "idx",
            json!({"patterns": "[\"logs-*\", \"metrics-*\"]", "owner": "<ops & co>"}),
        )];
        let body = renderer
            .render(
                r#"{"index_patterns": {{ .Values.idx.patterns | toJson }}, "owner": "{{ .Values.ns.idx.owner }}"}"#,
                &objects,
                "ns",
            )
            .unwrap();
        assert_eq!(
            body,
            r#"{"index_patterns": ["logs-*","metrics-*"], "owner": "<ops & co>"}"#
        );
    }

    #[test]
    fn test_render_range_over_map_binds_keys() {
        let renderer = BodyRenderer::new();
        let objects = [data("ns", "cfg", json!({"m": {"alpha": 1, "beta": 2}}))];
        let body = renderer
            .render(
                "{{ range $k, $v := .Values.cfg.m }}{{ $k }}={{ $v }};{{ end }}",
                &objects,
                "ns",
            )
            .unwrap();
        assert_eq!(body, "alpha=1;beta=2;");
    }

    #[test]
    fn test_render_range_over_list_binds_indexes() {
        let renderer = BodyRenderer::new();
        let objects = [data("ns", "cfg", json!({"hosts": ["a", "b"]}))];
        let body = renderer
            .render(
                r#"[{{ range $i, $h := .Values.cfg.hosts }}{{ if $i }},{{ end }}"{{ $i }}:{{ $h }}"{{ end }}]"#,
                &objects,
                "ns",
            )
            .unwrap();
        assert_eq!(body, r#"["0:a","1:b"]"#);
    }
}
