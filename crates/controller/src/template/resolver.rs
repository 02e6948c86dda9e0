//! # Reference Resolver
//!
//! Turns a declared object's template references into the ordered list of
//! data objects its body is rendered against.
//!
//! | Reference                       | Lookup                                          |
//! |---------------------------------|-------------------------------------------------|
//! | name + namespace                | get; missing is an error                        |
//! | name, `OwnNamespace` policy     | get in the declaring namespace; missing skipped |
//! | name, `ClusterWide` policy      | list everywhere, keep name matches              |
//! | selector + namespace            | list in that namespace                          |
//! | selector, no namespace          | list in own namespace or everywhere, by policy  |
//!
//! List results are ordered by `(namespace, name)`; the combined result keeps
//! the first occurrence of every `(namespace, name)`.

use crate::crd::{ReferenceTarget, ResourceTemplateData, TemplateReference};
use crate::store::{ObjectStore, StoreError};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Meaning of a template reference without an explicit namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NamespacePolicy {
    /// Look only in the declaring object's namespace
    #[default]
    OwnNamespace,
    /// Look in every namespace
    ClusterWide,
}

impl fmt::Display for NamespacePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespacePolicy::OwnNamespace => write!(f, "OwnNamespace"),
            NamespacePolicy::ClusterWide => write!(f, "ClusterWide"),
        }
    }
}

impl FromStr for NamespacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "OwnNamespace" => Ok(NamespacePolicy::OwnNamespace),
            "ClusterWide" => Ok(NamespacePolicy::ClusterWide),
            other => Err(format!(
                "unknown namespace policy '{other}', expected OwnNamespace or ClusterWide"
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("template reference #{index} must set exactly one of name or labelSelector")]
    InvalidReference { index: usize },
    #[error("ResourceTemplateData {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },
    #[error("failed to look up ResourceTemplateData: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ReferenceResolver {
    store: Arc<dyn ObjectStore<ResourceTemplateData>>,
}

impl fmt::Debug for ReferenceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceResolver").finish_non_exhaustive()
    }
}

impl ReferenceResolver {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore<ResourceTemplateData>>) -> Self {
        Self { store }
    }

    /// Resolve `references` for an object living in `default_namespace`
    pub async fn resolve(
        &self,
        references: &[TemplateReference],
        default_namespace: &str,
        policy: NamespacePolicy,
    ) -> Result<Vec<ResourceTemplateData>, ResolveError> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut resolved = Vec::new();

        for (index, reference) in references.iter().enumerate() {
            let target = reference
                .target()
                .ok_or(ResolveError::InvalidReference { index })?;
            let found = self
                .resolve_one(target, reference.namespace.as_deref(), default_namespace, policy)
                .await?;
            debug!(
                "Template reference #{} resolved to {} data object(s)",
                index,
                found.len()
            );
            for object in found {
                let key = (
                    object.metadata.namespace.clone().unwrap_or_default(),
                    object.metadata.name.clone().unwrap_or_default(),
                );
                if seen.insert(key) {
                    resolved.push(object);
                }
            }
        }
        Ok(resolved)
    }

    async fn resolve_one(
        &self,
        target: ReferenceTarget<'_>,
        namespace: Option<&str>,
        default_namespace: &str,
        policy: NamespacePolicy,
    ) -> Result<Vec<ResourceTemplateData>, ResolveError> {
        match (target, namespace) {
            (ReferenceTarget::ByName(name), Some(namespace)) => {
                match self.store.get(namespace, name).await? {
                    Some(object) => Ok(vec![object]),
                    None => Err(ResolveError::NotFound {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                    }),
                }
            }
            (ReferenceTarget::ByName(name), None) => match policy {
                NamespacePolicy::OwnNamespace => {
                    Ok(self.store.get(default_namespace, name).await?.into_iter().collect())
                }
                NamespacePolicy::ClusterWide => {
                    let mut matches: Vec<_> = self
                        .store
                        .list(None, None)
                        .await?
                        .into_iter()
                        .filter(|o| o.metadata.name.as_deref() == Some(name))
                        .collect();
                    sort_by_identity(&mut matches);
                    Ok(matches)
                }
            },
            (ReferenceTarget::BySelector(selector), namespace) => {
                let scope = match (namespace, policy) {
                    (Some(namespace), _) => Some(namespace),
                    (None, NamespacePolicy::OwnNamespace) => Some(default_namespace),
                    (None, NamespacePolicy::ClusterWide) => None,
                };
                let mut matches = self.store.list(scope, Some(selector)).await?;
                sort_by_identity(&mut matches);
                Ok(matches)
            }
        }
    }
}

fn sort_by_identity(objects: &mut [ResourceTemplateData]) {
    objects.sort_by(|a, b| {
        (&a.metadata.namespace, &a.metadata.name).cmp(&(&b.metadata.namespace, &b.metadata.name))
    });
}
