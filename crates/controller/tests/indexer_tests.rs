//! Reverse-dependency lookups across registered kinds.

mod common;

use common::{data_object, index_template};
use kube_runtime::reflector;
use kube_runtime::watcher;
use resource_controller::controller::indexer::{
    DependencyIndex, DependentRef, KindFilter, KindRegistry, ReflectorSource, SnapshotSource,
};
use resource_controller::controller::kinds;
use resource_controller::crd::kibana::DataViewSpec;
use resource_controller::crd::{
    DataView, IndexTemplate, LabelSelector, TargetInstance, TemplateReference, TemplateSpec,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn dependent(kind: &str, namespace: &str, name: &str) -> DependentRef {
    DependentRef {
        kind: kind.to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

fn data_view(namespace: &str, name: &str, references: Vec<TemplateReference>) -> DataView {
    let mut view = DataView::new(
        name,
        DataViewSpec {
            target_instance: Some(TargetInstance {
                name: "kibana".to_string(),
                namespace: Some("observability".to_string()),
            }),
            space: None,
            body: "{}".to_string(),
            template: Some(TemplateSpec { references }),
        },
    );
    view.metadata.namespace = Some(namespace.to_string());
    view
}

fn team_selector() -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([("team".to_string(), "a".to_string())])),
        ..LabelSelector::default()
    }
}

fn index() -> DependencyIndex {
    let registry = Arc::new(KindRegistry::new());
    registry.register(Arc::new(SnapshotSource::from_objects(
        kinds::default_policy("IndexTemplate"),
        &[
            index_template("team-a", "logs", "{}", vec![TemplateReference::named("cfg", None)]),
            index_template(
                "team-b",
                "metrics",
                "{}",
                vec![TemplateReference::named("cfg", Some("team-a"))],
            ),
            index_template("team-b", "traces", "{}", vec![TemplateReference::named("cfg", None)]),
            index_template("team-a", "plain", "{}", vec![]),
        ],
    )));
    registry.register(Arc::new(SnapshotSource::from_objects(
        kinds::default_policy("DataView"),
        &[
            data_view("shared", "by-name", vec![TemplateReference::named("cfg", None)]),
            data_view(
                "shared",
                "by-label",
                vec![TemplateReference::selector(team_selector(), None)],
            ),
        ],
    )));
    DependencyIndex::new(registry)
}

#[test]
fn test_data_change_finds_dependents_of_every_kind() {
    let cfg = data_object("team-a", "cfg", &[("team", "a")], json!({"host": "x"}));
    let found = index().find_dependents(&KindFilter::All, &cfg);
    assert_eq!(
        found,
        vec![
            dependent("DataView", "shared", "by-label"),
            dependent("DataView", "shared", "by-name"),
            dependent("IndexTemplate", "team-a", "logs"),
            dependent("IndexTemplate", "team-b", "metrics"),
        ]
    );
}

#[test]
fn test_own_namespace_references_do_not_cross_namespaces() {
    let cfg = data_object("team-b", "cfg", &[], json!({}));
    let found = index().find_dependents(&KindFilter::only("IndexTemplate"), &cfg);
    assert_eq!(found, vec![dependent("IndexTemplate", "team-b", "traces")]);
}

#[test]
fn test_label_selector_follows_current_labels() {
    let unlabelled = data_object("team-c", "other", &[], json!({}));
    assert!(index().find_dependents(&KindFilter::All, &unlabelled).is_empty());

    let labelled = data_object("team-c", "other", &[("team", "a")], json!({}));
    assert_eq!(
        index().find_dependents(&KindFilter::All, &labelled),
        vec![dependent("DataView", "shared", "by-label")]
    );
}

#[test]
fn test_instance_lookups() {
    let index = index();
    assert_eq!(
        index.find_by_instance(&KindFilter::All, "observability/kibana"),
        vec![
            dependent("DataView", "shared", "by-label"),
            dependent("DataView", "shared", "by-name"),
        ]
    );
    assert_eq!(index.find_by_instance(&KindFilter::All, "default").len(), 4);

    let cfg = data_object("team-a", "cfg", &[("team", "a")], json!({}));
    assert_eq!(
        index.find_dependents_targeting(&KindFilter::All, &cfg, "default"),
        vec![
            dependent("IndexTemplate", "team-a", "logs"),
            dependent("IndexTemplate", "team-b", "metrics"),
        ]
    );
}

#[test]
fn test_reflector_source_tracks_cache_contents() {
    let (reader, mut writer) = reflector::store::<IndexTemplate>();
    let registry = Arc::new(KindRegistry::new());
    registry.register(Arc::new(ReflectorSource::new(
        kinds::default_policy("IndexTemplate"),
        reader,
    )));
    let index = DependencyIndex::new(registry);
    let cfg = data_object("team-a", "cfg", &[], json!({}));

    assert!(index.find_dependents(&KindFilter::All, &cfg).is_empty());

    let logs = index_template("team-a", "logs", "{}", vec![TemplateReference::named("cfg", None)]);
    writer.apply_watcher_event(&watcher::Event::Apply(logs.clone()));
    assert_eq!(
        index.find_dependents(&KindFilter::All, &cfg),
        vec![dependent("IndexTemplate", "team-a", "logs")]
    );

    writer.apply_watcher_event(&watcher::Event::Delete(logs));
    assert!(index.find_dependents(&KindFilter::All, &cfg).is_empty());
}
