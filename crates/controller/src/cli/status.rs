//! # Status Command
//!
//! Shows the conditions and bookkeeping fields of a declared object.

use anyhow::{bail, Context, Result};
use kube::{api::Api, Client};
use resource_controller::controller::kinds;
use resource_controller::controller::reconciler::phase;
use resource_controller::crd::{
    ComponentTemplate, DataView, ElasticsearchApikey, ElasticsearchRole, ElasticsearchUser,
    IndexLifecyclePolicy, IndexTemplate, IngestPipeline, KibanaRole, ManagedResource,
    SavedObject, SnapshotLifecyclePolicy, SnapshotRepository, Space,
};

pub async fn status_command(client: Client, kind: &str, namespace: &str, name: &str) -> Result<()> {
    let Some(info) = kinds::KINDS
        .iter()
        .find(|k| k.kind.eq_ignore_ascii_case(kind))
    else {
        let known: Vec<&str> = kinds::KINDS.iter().map(|k| k.kind).collect();
        bail!("Unknown kind '{kind}'. Known kinds: {}", known.join(", "));
    };
    match info.kind {
        "ElasticsearchRole" => show::<ElasticsearchRole>(client, namespace, name).await,
        "ElasticsearchUser" => show::<ElasticsearchUser>(client, namespace, name).await,
        "ElasticsearchApikey" => show::<ElasticsearchApikey>(client, namespace, name).await,
        "IndexTemplate" => show::<IndexTemplate>(client, namespace, name).await,
        "ComponentTemplate" => show::<ComponentTemplate>(client, namespace, name).await,
        "IndexLifecyclePolicy" => show::<IndexLifecyclePolicy>(client, namespace, name).await,
        "SnapshotLifecyclePolicy" => {
            show::<SnapshotLifecyclePolicy>(client, namespace, name).await
        }
        "SnapshotRepository" => show::<SnapshotRepository>(client, namespace, name).await,
        "IngestPipeline" => show::<IngestPipeline>(client, namespace, name).await,
        "KibanaRole" => show::<KibanaRole>(client, namespace, name).await,
        "Space" => show::<Space>(client, namespace, name).await,
        "SavedObject" => show::<SavedObject>(client, namespace, name).await,
        "DataView" => show::<DataView>(client, namespace, name).await,
        other => bail!("Kind '{other}' has no status view"),
    }
}

async fn show<K: ManagedResource>(client: Client, namespace: &str, name: &str) -> Result<()> {
    let kind = K::kind_name();
    let object = Api::<K>::namespaced(client, namespace)
        .get(name)
        .await
        .with_context(|| format!("Failed to get {kind} '{namespace}/{name}'"))?;

    println!("Status for {kind} '{namespace}/{name}'");
    println!();
    println!("  Generation: {}", object.meta().generation.unwrap_or_default());
    println!("  Phase: {:?}", phase(&object));
    if let Some(target) = object.target_instance() {
        println!(
            "  Target Instance: {}/{}",
            target.namespace.as_deref().unwrap_or(namespace),
            target.name
        );
    } else {
        println!("  Target Instance: default");
    }

    let Some(status) = object.resource_status() else {
        println!();
        println!("Status: No status available (resource may not have been reconciled yet)");
        return Ok(());
    };
    if let Some(observed_generation) = status.observed_generation {
        println!("  Observed Generation: {observed_generation}");
    }
    if let Some(external_id) = &status.external_id {
        println!("  External ID: {external_id}");
    }
    if let Some(hash) = &status.applied_hash {
        println!("  Applied Hash: {hash}");
    }
    if let Some(last_reconcile_time) = &status.last_reconcile_time {
        println!("  Last Reconcile Time: {last_reconcile_time}");
    }

    if !status.conditions.is_empty() {
        println!();
        println!("Conditions:");
        for condition in &status.conditions {
            println!("  {}: {}", condition.r#type, condition.status);
            if let Some(reason) = &condition.reason {
                println!("    Reason: {reason}");
            }
            if let Some(message) = condition.message.as_deref().filter(|m| !m.is_empty()) {
                println!("    Message: {message}");
            }
            if let Some(last_transition_time) = &condition.last_transition_time {
                println!("    Last Transition: {last_transition_time}");
            }
        }
    }
    Ok(())
}
