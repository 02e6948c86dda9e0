//! Declared kinds known to the controller.

use crate::crd::{
    ComponentTemplate, DataView, ElasticsearchApikey, ElasticsearchInstance, ElasticsearchRole,
    ElasticsearchUser, IndexLifecyclePolicy, IndexTemplate, IngestPipeline, KibanaInstance,
    KibanaRole, ResourceTemplateData, SavedObject, Service, SnapshotLifecyclePolicy,
    SnapshotRepository, Space,
};
use crate::template::NamespacePolicy;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// Static facts about a declared kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindInfo {
    pub kind: &'static str,
    pub service: Service,
    /// Meaning of a template reference without a namespace
    pub default_policy: NamespacePolicy,
}

const fn es(kind: &'static str) -> KindInfo {
    KindInfo {
        kind,
        service: Service::Elasticsearch,
        default_policy: NamespacePolicy::OwnNamespace,
    }
}

const fn kibana(kind: &'static str, default_policy: NamespacePolicy) -> KindInfo {
    KindInfo {
        kind,
        service: Service::Kibana,
        default_policy,
    }
}

pub const KINDS: [KindInfo; 13] = [
    es("ElasticsearchRole"),
    es("ElasticsearchUser"),
    es("ElasticsearchApikey"),
    es("IndexTemplate"),
    es("ComponentTemplate"),
    es("IndexLifecyclePolicy"),
    es("SnapshotLifecyclePolicy"),
    es("SnapshotRepository"),
    es("IngestPipeline"),
    kibana("KibanaRole", NamespacePolicy::OwnNamespace),
    kibana("Space", NamespacePolicy::OwnNamespace),
    kibana("SavedObject", NamespacePolicy::ClusterWide),
    kibana("DataView", NamespacePolicy::ClusterWide),
];

#[must_use]
pub fn info(kind: &str) -> Option<KindInfo> {
    KINDS.iter().copied().find(|k| k.kind == kind)
}

/// Default namespace policy of `kind`; unknown kinds use the own namespace
#[must_use]
pub fn default_policy(kind: &str) -> NamespacePolicy {
    info(kind).map_or(NamespacePolicy::OwnNamespace, |k| k.default_policy)
}

/// Every CustomResourceDefinition the controller serves or reads
#[must_use]
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        ElasticsearchInstance::crd(),
        KibanaInstance::crd(),
        ResourceTemplateData::crd(),
        ElasticsearchRole::crd(),
        ElasticsearchUser::crd(),
        ElasticsearchApikey::crd(),
        IndexTemplate::crd(),
        ComponentTemplate::crd(),
        IndexLifecyclePolicy::crd(),
        SnapshotLifecyclePolicy::crd(),
        SnapshotRepository::crd(),
        IngestPipeline::crd(),
        KibanaRole::crd(),
        Space::crd(),
        SavedObject::crd(),
        DataView::crd(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ManagedResource;

    fn assert_registered<K: ManagedResource>() {
        let kind = K::kind_name();
        let info = info(&kind).unwrap_or_else(|| panic!("{kind} missing from KINDS"));
        assert_eq!(info.service, K::SERVICE);
    }

    #[test]
    fn test_every_declared_kind_is_listed() {
        assert_registered::<ElasticsearchRole>();
        assert_registered::<ElasticsearchUser>();
        assert_registered::<ElasticsearchApikey>();
        assert_registered::<IndexTemplate>();
        assert_registered::<ComponentTemplate>();
        assert_registered::<IndexLifecyclePolicy>();
        assert_registered::<SnapshotLifecyclePolicy>();
        assert_registered::<SnapshotRepository>();
        assert_registered::<IngestPipeline>();
        assert_registered::<KibanaRole>();
        assert_registered::<Space>();
        assert_registered::<SavedObject>();
        assert_registered::<DataView>();
    }

    #[test]
    fn test_default_policies() {
        assert_eq!(default_policy("IndexTemplate"), NamespacePolicy::OwnNamespace);
        assert_eq!(default_policy("SavedObject"), NamespacePolicy::ClusterWide);
        assert_eq!(default_policy("DataView"), NamespacePolicy::ClusterWide);
        assert_eq!(default_policy("Unknown"), NamespacePolicy::OwnNamespace);
    }

    #[test]
    fn test_crds_have_unique_names() {
        let mut names: Vec<String> = crds()
            .into_iter()
            .filter_map(|crd| crd.metadata.name)
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(names.contains(&"indextemplates.es.eck.github.com".to_string()));
    }
}
