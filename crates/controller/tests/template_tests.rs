//! Reference resolution and body rendering against stored data objects.

mod common;

use common::data_object;
use resource_controller::crd::{LabelSelector, ResourceTemplateData, TemplateReference};
use resource_controller::store::MemoryStore;
use resource_controller::template::{BodyRenderer, NamespacePolicy, ReferenceResolver, ResolveError};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

fn selector(labels: &[(&str, &str)]) -> LabelSelector {
    LabelSelector {
        match_labels: Some(
            labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..LabelSelector::default()
    }
}

fn identities(objects: &[ResourceTemplateData]) -> Vec<String> {
    objects
        .iter()
        .map(|o| {
            format!(
                "{}/{}",
                o.metadata.namespace.as_deref().unwrap_or_default(),
                o.metadata.name.as_deref().unwrap_or_default()
            )
        })
        .collect()
}

fn store() -> Arc<MemoryStore<ResourceTemplateData>> {
    let store = Arc::new(MemoryStore::new());
    for object in [
        data_object("team-a", "cfg", &[("tier", "gold")], json!({"host": "db.local"})),
        data_object("team-a", "extra", &[("tier", "gold")], json!({"port": "5432"})),
        data_object("team-b", "cfg", &[("tier", "gold")], json!({"host": "db.other"})),
        data_object("platform", "defaults", &[], json!({"replicas": 2})),
    ] {
        store.insert(object).unwrap();
    }
    store
}

#[tokio::test]
async fn test_body_without_references_renders_unchanged() {
    let renderer = BodyRenderer::new();
    let body = renderer.render(r#"{"static":"v"}"#, &[], "team-a").unwrap();
    assert_eq!(body, r#"{"static":"v"}"#);
}

#[tokio::test]
async fn test_named_reference_renders_through_shortcut() {
    let resolver = ReferenceResolver::new(store());
    let data = resolver
        .resolve(
            &[TemplateReference::named("cfg", None)],
            "team-a",
            NamespacePolicy::OwnNamespace,
        )
        .await
        .unwrap();
    assert_eq!(identities(&data), vec!["team-a/cfg"]);

    let body = BodyRenderer::new()
        .render(r#""{{ .Values.cfg.host }}""#, &data, "team-a")
        .unwrap();
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!("db.local"));
}

#[tokio::test]
async fn test_missing_own_namespace_name_is_skipped() {
    let resolver = ReferenceResolver::new(store());
    let data = resolver
        .resolve(
            &[TemplateReference::named("absent", None)],
            "team-a",
            NamespacePolicy::OwnNamespace,
        )
        .await
        .unwrap();
    assert!(data.is_empty());
}

#[tokio::test]
async fn test_missing_namespaced_name_is_an_error() {
    let resolver = ReferenceResolver::new(store());
    let err = resolver
        .resolve(
            &[TemplateReference::named("absent", Some("platform"))],
            "team-a",
            NamespacePolicy::OwnNamespace,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::NotFound { ref namespace, ref name }
        if namespace == "platform" && name == "absent"));
}

#[tokio::test]
async fn test_cluster_wide_name_matches_every_namespace_in_order() {
    let resolver = ReferenceResolver::new(store());
    let data = resolver
        .resolve(
            &[TemplateReference::named("cfg", None)],
            "platform",
            NamespacePolicy::ClusterWide,
        )
        .await
        .unwrap();
    assert_eq!(identities(&data), vec!["team-a/cfg", "team-b/cfg"]);
}

#[tokio::test]
async fn test_selector_scope_follows_policy() {
    let resolver = ReferenceResolver::new(store());
    let gold = [TemplateReference::selector(selector(&[("tier", "gold")]), None)];

    let own = resolver
        .resolve(&gold, "team-a", NamespacePolicy::OwnNamespace)
        .await
        .unwrap();
    assert_eq!(identities(&own), vec!["team-a/cfg", "team-a/extra"]);

    let everywhere = resolver
        .resolve(&gold, "team-a", NamespacePolicy::ClusterWide)
        .await
        .unwrap();
    assert_eq!(
        identities(&everywhere),
        vec!["team-a/cfg", "team-a/extra", "team-b/cfg"]
    );

    let pinned = resolver
        .resolve(
            &[TemplateReference::selector(selector(&[("tier", "gold")]), Some("team-b"))],
            "team-a",
            NamespacePolicy::OwnNamespace,
        )
        .await
        .unwrap();
    assert_eq!(identities(&pinned), vec!["team-b/cfg"]);
}

#[tokio::test]
async fn test_duplicates_keep_first_occurrence() {
    let resolver = ReferenceResolver::new(store());
    let data = resolver
        .resolve(
            &[
                TemplateReference::named("extra", None),
                TemplateReference::selector(selector(&[("tier", "gold")]), None),
                TemplateReference::named("defaults", Some("platform")),
            ],
            "team-a",
            NamespacePolicy::OwnNamespace,
        )
        .await
        .unwrap();
    assert_eq!(
        identities(&data),
        vec!["team-a/extra", "team-a/cfg", "platform/defaults"]
    );
}

#[tokio::test]
async fn test_reference_with_name_and_selector_is_invalid() {
    let resolver = ReferenceResolver::new(store());
    let reference = TemplateReference {
        name: Some("cfg".to_string()),
        namespace: None,
        label_selector: Some(selector(&[("tier", "gold")])),
    };
    let err = resolver
        .resolve(
            &[TemplateReference::named("cfg", None), reference],
            "team-a",
            NamespacePolicy::OwnNamespace,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::InvalidReference { index: 1 }));
}

#[tokio::test]
async fn test_rendering_is_deterministic() {
    let resolver = ReferenceResolver::new(store());
    let references = [
        TemplateReference::selector(selector(&[("tier", "gold")]), None),
        TemplateReference::named("defaults", Some("platform")),
    ];
    let template = r#"{
        "hosts": ["{{ .Values.teamA.cfg.host }}", "{{ .Values.teamB.cfg.host }}"],
        "port": {{ .Values.extra.port }},
        "replicas": {{ .Values.platform.defaults.replicas }}
    }"#;

    let renderer = BodyRenderer::new();
    let mut outputs = Vec::new();
    for _ in 0..3 {
        let data = resolver
            .resolve(&references, "team-a", NamespacePolicy::ClusterWide)
            .await
            .unwrap();
        outputs.push(renderer.render(template, &data, "team-a").unwrap());
    }
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));

    let body: Value = serde_json::from_str(&outputs[0]).unwrap();
    assert_eq!(body["replicas"], json!(2));
    assert_eq!(body["hosts"], json!(["db.local", "db.other"]));
    assert_eq!(body["port"], json!(5432));
}

#[tokio::test]
async fn test_namespace_entry_reaches_other_namespaces() {
    let resolver = ReferenceResolver::new(store());
    let data = resolver
        .resolve(
            &[TemplateReference::named("cfg", Some("team-b"))],
            "team-a",
            NamespacePolicy::OwnNamespace,
        )
        .await
        .unwrap();

    let renderer = BodyRenderer::new();
    let body = renderer
        .render(r#"{"host": "{{ .Values.teamB.cfg.host }}"}"#, &data, "team-a")
        .unwrap();
    assert_eq!(body, r#"{"host": "db.other"}"#);
    assert!(renderer
        .render(r#"{"host": "{{ .Values.cfg.host }}"}"#, &data, "team-a")
        .is_err());
}
