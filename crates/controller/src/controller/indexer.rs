//! # Reverse-Dependency Indexer
//!
//! Answers "which declared objects depend on this data object (or instance)?"
//! so that a change to a `ResourceTemplateData` or an instance object can
//! re-enqueue every affected declared object.
//!
//! Kinds are registered explicitly in a [`KindRegistry`]. Each registration is
//! a [`DependentSource`] giving the kind's namespace policy and a snapshot of
//! its declared objects; at runtime the snapshot comes from the controller's
//! reflector cache.

use crate::crd::{ManagedResource, ReferenceTarget, ResourceTemplateData, TemplateReference};
use crate::external::instance::target_key;
use crate::store::labels;
use crate::template::NamespacePolicy;
use kube_runtime::reflector::Store;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

/// A declared object as seen by the indexer
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredEntry {
    pub namespace: String,
    pub name: String,
    pub references: Vec<TemplateReference>,
    /// `namespace/name` of the targeted instance, `default` without a target
    pub target: String,
}

impl DeclaredEntry {
    #[must_use]
    pub fn from_object<K: ManagedResource>(obj: &K) -> Self {
        let namespace = obj.meta().namespace.clone().unwrap_or_default();
        Self {
            name: obj.meta().name.clone().unwrap_or_default(),
            references: obj.references().to_vec(),
            target: target_key(obj.target_instance(), &namespace),
            namespace,
        }
    }
}

/// Identity of a dependent declared object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependentRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for DependentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Declared objects of one kind
pub trait DependentSource: Send + Sync {
    fn kind(&self) -> &str;

    /// Meaning of a reference without a namespace for this kind
    fn policy(&self) -> NamespacePolicy;

    fn entries(&self) -> Vec<DeclaredEntry>;
}

/// Source backed by a controller's reflector cache
pub struct ReflectorSource<K: ManagedResource> {
    kind: String,
    policy: NamespacePolicy,
    store: Store<K>,
}

impl<K: ManagedResource> std::fmt::Debug for ReflectorSource<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectorSource")
            .field("kind", &self.kind)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<K: ManagedResource> ReflectorSource<K> {
    #[must_use]
    pub fn new(policy: NamespacePolicy, store: Store<K>) -> Self {
        Self {
            kind: K::kind_name(),
            policy,
            store,
        }
    }
}

impl<K: ManagedResource> DependentSource for ReflectorSource<K> {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn policy(&self) -> NamespacePolicy {
        self.policy
    }

    fn entries(&self) -> Vec<DeclaredEntry> {
        self.store
            .state()
            .iter()
            .map(|obj| DeclaredEntry::from_object(obj.as_ref()))
            .collect()
    }
}

/// Source holding a fixed list of entries (CLI lookups, tests)
#[derive(Debug)]
pub struct SnapshotSource {
    kind: String,
    policy: NamespacePolicy,
    entries: Vec<DeclaredEntry>,
}

impl SnapshotSource {
    #[must_use]
    pub fn new(kind: &str, policy: NamespacePolicy, entries: Vec<DeclaredEntry>) -> Self {
        Self {
            kind: kind.to_string(),
            policy,
            entries,
        }
    }

    #[must_use]
    pub fn from_objects<K: ManagedResource>(policy: NamespacePolicy, objects: &[K]) -> Self {
        Self {
            kind: K::kind_name(),
            policy,
            entries: objects.iter().map(DeclaredEntry::from_object).collect(),
        }
    }
}

impl DependentSource for SnapshotSource {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn policy(&self) -> NamespacePolicy {
        self.policy
    }

    fn entries(&self) -> Vec<DeclaredEntry> {
        self.entries.clone()
    }
}

/// Registered templating-capable kinds
#[derive(Default)]
pub struct KindRegistry {
    sources: RwLock<BTreeMap<String, Arc<dyn DependentSource>>>,
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl KindRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source`, replacing an earlier registration of the same kind
    pub fn register(&self, source: Arc<dyn DependentSource>) {
        let mut sources = self
            .sources
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        sources.insert(source.kind().to_string(), source);
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.sources().into_iter().map(|s| s.kind().to_string()).collect()
    }

    fn sources(&self) -> Vec<Arc<dyn DependentSource>> {
        self.sources
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

/// Which kinds a lookup covers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl KindFilter {
    #[must_use]
    pub fn only(kind: &str) -> Self {
        KindFilter::Only(BTreeSet::from([kind.to_string()]))
    }

    #[must_use]
    pub fn matches(&self, kind: &str) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Only(kinds) => kinds.contains(kind),
        }
    }
}

/// Whether `reference`, declared in `declared_namespace`, selects `data`
#[must_use]
pub fn reference_matches(
    reference: &TemplateReference,
    policy: NamespacePolicy,
    declared_namespace: &str,
    data: &ResourceTemplateData,
) -> bool {
    let data_namespace = data.metadata.namespace.as_deref().unwrap_or_default();
    let wanted_namespace = match (reference.namespace.as_deref(), policy) {
        (Some(namespace), _) => Some(namespace),
        (None, NamespacePolicy::OwnNamespace) => Some(declared_namespace),
        (None, NamespacePolicy::ClusterWide) => None,
    };
    if wanted_namespace.is_some_and(|ns| ns != data_namespace) {
        return false;
    }
    match reference.target() {
        Some(ReferenceTarget::ByName(name)) => data.metadata.name.as_deref() == Some(name),
        Some(ReferenceTarget::BySelector(selector)) => {
            labels::matches(selector, data.metadata.labels.as_ref())
        }
        None => false,
    }
}

/// Reverse-dependency lookups over a [`KindRegistry`]
#[derive(Debug, Clone)]
pub struct DependencyIndex {
    registry: Arc<KindRegistry>,
}

impl DependencyIndex {
    #[must_use]
    pub fn new(registry: Arc<KindRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<KindRegistry> {
        &self.registry
    }

    /// Declared objects whose references select `data`
    #[must_use]
    pub fn find_dependents(
        &self,
        filter: &KindFilter,
        data: &ResourceTemplateData,
    ) -> Vec<DependentRef> {
        self.collect(filter, |policy, entry| {
            entry
                .references
                .iter()
                .any(|r| reference_matches(r, policy, &entry.namespace, data))
        })
    }

    /// Like [`Self::find_dependents`], restricted to objects targeting `instance`
    #[must_use]
    pub fn find_dependents_targeting(
        &self,
        filter: &KindFilter,
        data: &ResourceTemplateData,
        instance: &str,
    ) -> Vec<DependentRef> {
        self.collect(filter, |policy, entry| {
            entry.target == instance
                && entry
                    .references
                    .iter()
                    .any(|r| reference_matches(r, policy, &entry.namespace, data))
        })
    }

    /// Declared objects targeting `instance` (`namespace/name` or `default`)
    #[must_use]
    pub fn find_by_instance(&self, filter: &KindFilter, instance: &str) -> Vec<DependentRef> {
        self.collect(filter, |_, entry| entry.target == instance)
    }

    fn collect(
        &self,
        filter: &KindFilter,
        keep: impl Fn(NamespacePolicy, &DeclaredEntry) -> bool,
    ) -> Vec<DependentRef> {
        let mut found: Vec<DependentRef> = self
            .registry
            .sources()
            .into_iter()
            .filter(|source| filter.matches(source.kind()))
            .flat_map(|source| {
                let kind = source.kind().to_string();
                let policy = source.policy();
                source
                    .entries()
                    .into_iter()
                    .filter(|entry| keep(policy, entry))
                    .map(|entry| DependentRef {
                        kind: kind.clone(),
                        namespace: entry.namespace,
                        name: entry.name,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        found.sort();
        found.dedup();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{LabelSelector, ResourceTemplateDataSpec};
    use kube::api::ObjectMeta;

    fn data(namespace: &str, name: &str, labels: &[(&str, &str)]) -> ResourceTemplateData {
        ResourceTemplateData {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                ),
                ..ObjectMeta::default()
            },
            spec: ResourceTemplateDataSpec::default(),
        }
    }

    fn entry(namespace: &str, name: &str, references: Vec<TemplateReference>) -> DeclaredEntry {
        DeclaredEntry {
            namespace: namespace.to_string(),
            name: name.to_string(),
            references,
            target: "default".to_string(),
        }
    }

    fn selector(key: &str, value: &str) -> LabelSelector {
        LabelSelector {
            match_labels: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
            ..LabelSelector::default()
        }
    }

    #[test]
    fn test_reference_matches_by_name_and_policy() {
        let target = data("team-a", "settings", &[]);
        let unscoped = TemplateReference::named("settings", None);
        assert!(reference_matches(&unscoped, NamespacePolicy::OwnNamespace, "team-a", &target));
        assert!(!reference_matches(&unscoped, NamespacePolicy::OwnNamespace, "team-b", &target));
        assert!(reference_matches(&unscoped, NamespacePolicy::ClusterWide, "team-b", &target));

        let scoped = TemplateReference::named("settings", Some("team-a"));
        assert!(reference_matches(&scoped, NamespacePolicy::OwnNamespace, "team-b", &target));
        let elsewhere = TemplateReference::named("settings", Some("team-c"));
        assert!(!reference_matches(&elsewhere, NamespacePolicy::ClusterWide, "team-a", &target));
    }

    #[test]
    fn test_reference_matches_by_selector() {
        let target = data("team-a", "settings", &[("tier", "gold")]);
        let gold = TemplateReference::selector(selector("tier", "gold"), None);
        let silver = TemplateReference::selector(selector("tier", "silver"), None);
        assert!(reference_matches(&gold, NamespacePolicy::OwnNamespace, "team-a", &target));
        assert!(!reference_matches(&silver, NamespacePolicy::OwnNamespace, "team-a", &target));
    }

    #[test]
    fn test_results_sorted_and_filtered_by_kind() {
        let registry = Arc::new(KindRegistry::new());
        registry.register(Arc::new(SnapshotSource::new(
            "Space",
            NamespacePolicy::ClusterWide,
            vec![entry("z", "b", vec![TemplateReference::named("settings", None)])],
        )));
        registry.register(Arc::new(SnapshotSource::new(
            "IndexTemplate",
            NamespacePolicy::OwnNamespace,
            vec![
                entry("team-a", "logs", vec![TemplateReference::named("settings", None)]),
                entry("team-a", "audit", vec![TemplateReference::named("settings", None)]),
                entry("team-b", "other", vec![TemplateReference::named("settings", None)]),
            ],
        )));
        let index = DependencyIndex::new(registry);
        let found = index.find_dependents(&KindFilter::All, &data("team-a", "settings", &[]));
        let names: Vec<String> = found.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "IndexTemplate team-a/audit",
                "IndexTemplate team-a/logs",
                "Space z/b"
            ]
        );

        let settings = data("team-a", "settings", &[]);
        let only = index.find_dependents(&KindFilter::only("Space"), &settings);
        assert_eq!(only.len(), 1);
    }

    #[test]
    fn test_register_replaces_kind() {
        let registry = KindRegistry::new();
        for policy in [NamespacePolicy::ClusterWide, NamespacePolicy::OwnNamespace] {
            registry.register(Arc::new(SnapshotSource::new("Space", policy, vec![])));
        }
        assert_eq!(registry.kinds(), vec!["Space".to_string()]);
    }
}
