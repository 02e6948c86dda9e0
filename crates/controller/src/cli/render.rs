//! # Render Command
//!
//! Offline rendering of a declared object's body against data object files.

use anyhow::{anyhow, Context, Result};
use kube::api::ObjectMeta;
use resource_controller::controller::kinds;
use resource_controller::controller::reconciler::body_hash;
use resource_controller::crd::{ResourceTemplateData, TemplateSpec};
use resource_controller::store::MemoryStore;
use resource_controller::template::{BodyRenderer, NamespacePolicy, ReferenceResolver};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The parts of a declared object rendering needs
#[derive(Debug, Deserialize)]
struct DeclaredDocument {
    kind: String,
    #[serde(default)]
    metadata: ObjectMeta,
    spec: DeclaredSpec,
}

#[derive(Debug, Deserialize)]
struct DeclaredSpec {
    #[serde(default)]
    body: String,
    #[serde(default)]
    template: TemplateSpec,
}

#[derive(Debug)]
pub struct Rendered {
    pub body: Value,
    pub hash: String,
}

pub async fn render_files(
    object: &Path,
    data: &[PathBuf],
    policy: Option<NamespacePolicy>,
) -> Result<Rendered> {
    let object_text = std::fs::read_to_string(object)
        .with_context(|| format!("Failed to read {}", object.display()))?;
    let mut data_objects = Vec::new();
    for path in data {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let parsed = parse_data_objects(&text)
            .with_context(|| format!("Invalid data file {}", path.display()))?;
        data_objects.extend(parsed);
    }
    render_text(&object_text, data_objects, policy).await
}

/// Parse a multi-document YAML stream of `ResourceTemplateData` objects
pub fn parse_data_objects(text: &str) -> Result<Vec<ResourceTemplateData>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let mut object: ResourceTemplateData = serde_yaml::from_value(value)?;
        if object.metadata.namespace.is_none() {
            object.metadata.namespace = Some("default".to_string());
        }
        objects.push(object);
    }
    Ok(objects)
}

pub async fn render_text(
    object_text: &str,
    data: Vec<ResourceTemplateData>,
    policy: Option<NamespacePolicy>,
) -> Result<Rendered> {
    let document: DeclaredDocument =
        serde_yaml::from_str(object_text).context("Invalid declared object")?;
    let namespace = document
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());
    let policy = policy.unwrap_or_else(|| kinds::default_policy(&document.kind));

    let store = Arc::new(MemoryStore::<ResourceTemplateData>::new());
    for object in data {
        store.insert(object)?;
    }
    let resolved = ReferenceResolver::new(store)
        .resolve(&document.spec.template.references, &namespace, policy)
        .await?;
    let text = BodyRenderer::new().render(&document.spec.body, &resolved, &namespace)?;

    let body: Value = if text.trim().is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(&text)
            .map_err(|e| anyhow!("rendered body is not valid JSON: {e}\n{text}"))?
    };
    let hash = body_hash(&serde_json::to_string(&body)?);
    Ok(Rendered { body, hash })
}
