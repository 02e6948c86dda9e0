//! # Dependents Command
//!
//! Lists declared objects whose template references select a
//! `ResourceTemplateData`, using the same matching as the controller.

use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use resource_controller::config::ControllerConfig;
use resource_controller::controller::indexer::{
    DependencyIndex, KindFilter, KindRegistry, SnapshotSource,
};
use resource_controller::controller::kinds;
use resource_controller::crd::{
    ComponentTemplate, DataView, ElasticsearchApikey, ElasticsearchRole, ElasticsearchUser,
    IndexLifecyclePolicy, IndexTemplate, IngestPipeline, KibanaRole, ManagedResource,
    ResourceTemplateData, SavedObject, SnapshotLifecyclePolicy, SnapshotRepository, Space,
};
use std::collections::BTreeSet;
use std::sync::Arc;

pub async fn dependents_command(
    client: Client,
    namespace: &str,
    name: &str,
    kinds_wanted: &[String],
) -> Result<()> {
    let data: ResourceTemplateData = Api::namespaced(client.clone(), namespace)
        .get(name)
        .await
        .with_context(|| format!("Failed to get ResourceTemplateData '{namespace}/{name}'"))?;

    let filter = if kinds_wanted.is_empty() {
        KindFilter::All
    } else {
        KindFilter::Only(kinds_wanted.iter().cloned().collect::<BTreeSet<_>>())
    };
    let config = ControllerConfig::from_env();
    let registry = Arc::new(KindRegistry::new());
    let loader = Loader {
        client: &client,
        config: &config,
        filter: &filter,
        registry: &registry,
    };
    loader.load::<ElasticsearchRole>().await?;
    loader.load::<ElasticsearchUser>().await?;
    loader.load::<ElasticsearchApikey>().await?;
    loader.load::<IndexTemplate>().await?;
    loader.load::<ComponentTemplate>().await?;
    loader.load::<IndexLifecyclePolicy>().await?;
    loader.load::<SnapshotLifecyclePolicy>().await?;
    loader.load::<SnapshotRepository>().await?;
    loader.load::<IngestPipeline>().await?;
    loader.load::<KibanaRole>().await?;
    loader.load::<Space>().await?;
    loader.load::<SavedObject>().await?;
    loader.load::<DataView>().await?;

    let found = DependencyIndex::new(registry).find_dependents(&filter, &data);
    if found.is_empty() {
        println!("No declared objects reference ResourceTemplateData '{namespace}/{name}'");
    } else {
        println!("{:<26} {:<24} NAME", "KIND", "NAMESPACE");
        for dependent in found {
            println!(
                "{:<26} {:<24} {}",
                dependent.kind, dependent.namespace, dependent.name
            );
        }
    }
    Ok(())
}

struct Loader<'a> {
    client: &'a Client,
    config: &'a ControllerConfig,
    filter: &'a KindFilter,
    registry: &'a Arc<KindRegistry>,
}

impl Loader<'_> {
    async fn load<K: ManagedResource>(&self) -> Result<()> {
        let kind = K::kind_name();
        if !self.filter.matches(&kind) {
            return Ok(());
        }
        let objects = Api::<K>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list {kind} objects"))?;
        let policy = self
            .config
            .reference_policy(&kind, kinds::default_policy(&kind));
        self.registry.register(Arc::new(SnapshotSource::from_objects(
            policy,
            &objects.items,
        )));
        Ok(())
    }
}
