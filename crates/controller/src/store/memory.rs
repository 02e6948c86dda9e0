//! In-process store with the API server's optimistic concurrency rules.
//!
//! Every write bumps `metadata.resourceVersion`; writes carrying a stale
//! version fail with `StoreError::Conflict`. Deleting an object that still
//! carries finalizers only sets `deletionTimestamp`; the object disappears
//! once the last finalizer is removed.

use crate::crd::{LabelSelector, ManagedResource, ResourceStatus};
use crate::store::labels;
use crate::store::patch::{apply_merge_patch, is_empty_patch, merge_diff};
use crate::store::{DeclaredObjectStore, ObjectStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

type Key = (String, String);

/// `ObjectStore` keeping objects in memory
#[derive(Debug)]
pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<Key, K>>,
    version: AtomicU64,
    pending_conflicts: AtomicUsize,
    status_writes: AtomicUsize,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(1),
            pending_conflicts: AtomicUsize::new(0),
            status_writes: AtomicUsize::new(0),
        }
    }
}

fn key_of<K: Resource>(obj: &K) -> Result<Key, StoreError> {
    let namespace = obj
        .meta()
        .namespace
        .clone()
        .ok_or_else(|| StoreError::InvalidObject("object has no namespace".to_string()))?;
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| StoreError::InvalidObject("object has no name".to_string()))?;
    Ok((namespace, name))
}

impl<K> MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Key, K>> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn next_version(&self) -> String {
        self.version.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn conflict(key: &Key) -> StoreError {
        StoreError::Conflict {
            kind: K::kind(&()).to_string(),
            namespace: key.0.clone(),
            name: key.1.clone(),
        }
    }

    fn not_found(key: &Key) -> StoreError {
        StoreError::NotFound {
            kind: K::kind(&()).to_string(),
            namespace: key.0.clone(),
            name: key.1.clone(),
        }
    }

    /// Insert or replace an object as the API server would on create
    ///
    /// Assigns a fresh resourceVersion and defaults `generation` to 1.
    pub fn insert(&self, mut obj: K) -> Result<K, StoreError> {
        let key = key_of(&obj)?;
        let meta = obj.meta_mut();
        meta.resource_version = Some(self.next_version());
        if meta.generation.is_none() {
            meta.generation = Some(1);
        }
        self.lock().insert(key, obj.clone());
        Ok(obj)
    }

    /// Mutate the stored object's spec, bumping generation and resourceVersion
    pub fn update_spec(
        &self,
        namespace: &str,
        name: &str,
        mutate: impl FnOnce(&mut K),
    ) -> Result<K, StoreError> {
        let key = (namespace.to_string(), name.to_string());
        let version = self.next_version();
        let mut objects = self.lock();
        let obj = objects.get_mut(&key).ok_or_else(|| Self::not_found(&key))?;
        mutate(obj);
        let meta = obj.meta_mut();
        meta.generation = Some(meta.generation.unwrap_or(0) + 1);
        meta.resource_version = Some(version);
        Ok(obj.clone())
    }

    /// Mutate metadata only (labels, annotations), bumping resourceVersion
    pub fn update_metadata(
        &self,
        namespace: &str,
        name: &str,
        mutate: impl FnOnce(&mut K),
    ) -> Result<K, StoreError> {
        let key = (namespace.to_string(), name.to_string());
        let version = self.next_version();
        let mut objects = self.lock();
        let obj = objects.get_mut(&key).ok_or_else(|| Self::not_found(&key))?;
        mutate(obj);
        obj.meta_mut().resource_version = Some(version);
        Ok(obj.clone())
    }

    /// Request deletion: removes the object outright when it has no
    /// finalizers, otherwise sets `deletionTimestamp`
    pub fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let key = (namespace.to_string(), name.to_string());
        let version = self.next_version();
        let timestamp: Time = serde_json::from_value(serde_json::Value::String(
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        ))?;
        let mut objects = self.lock();
        let obj = objects.get_mut(&key).ok_or_else(|| Self::not_found(&key))?;
        if obj.meta().finalizers.as_ref().is_none_or(Vec::is_empty) {
            objects.remove(&key);
            return Ok(());
        }
        let meta = obj.meta_mut();
        if meta.deletion_timestamp.is_none() {
            meta.deletion_timestamp = Some(timestamp);
            meta.resource_version = Some(version);
        }
        Ok(())
    }

    /// Current copy of a stored object
    #[must_use]
    pub fn snapshot(&self, namespace: &str, name: &str) -> Option<K> {
        self.lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Make the next `count` guarded writes fail with a conflict
    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of status patches applied so far
    #[must_use]
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    fn take_injected_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Run a write against the stored copy after checking `obj`'s resourceVersion
    fn guarded_write(
        &self,
        obj: &K,
        write: impl FnOnce(&mut K) -> Result<(), StoreError>,
    ) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        if self.take_injected_conflict() {
            return Err(Self::conflict(&key));
        }
        let version = self.next_version();
        let mut objects = self.lock();
        let stored = objects.get_mut(&key).ok_or_else(|| Self::not_found(&key))?;
        if stored.meta().resource_version != obj.meta().resource_version {
            return Err(Self::conflict(&key));
        }
        write(stored)?;
        stored.meta_mut().resource_version = Some(version);
        let updated = stored.clone();

        let finalized = updated.meta().deletion_timestamp.is_some()
            && updated.meta().finalizers.as_ref().is_none_or(Vec::is_empty);
        if finalized {
            objects.remove(&key);
        }
        Ok(updated)
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        Ok(self.snapshot(namespace, name))
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<K>, StoreError> {
        let selector = selector.map(labels::parse).transpose()?;
        Ok(self
            .lock()
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns.as_str()))
            .filter(|(_, obj)| {
                selector
                    .as_ref()
                    .is_none_or(|s| labels::selects(s, obj.meta().labels.as_ref()))
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }
}

#[async_trait]
impl<K> DeclaredObjectStore<K> for MemoryStore<K>
where
    K: ManagedResource,
{
    async fn add_finalizer(&self, obj: &K, token: &str) -> Result<K, StoreError> {
        self.guarded_write(obj, |stored| {
            let finalizers = stored.meta_mut().finalizers.get_or_insert_with(Vec::new);
            if !finalizers.iter().any(|f| f == token) {
                finalizers.push(token.to_string());
            }
            Ok(())
        })
    }

    async fn remove_finalizer(&self, obj: &K, token: &str) -> Result<K, StoreError> {
        self.guarded_write(obj, |stored| {
            if let Some(finalizers) = stored.meta_mut().finalizers.as_mut() {
                finalizers.retain(|f| f != token);
            }
            Ok(())
        })
    }

    async fn patch_status(
        &self,
        obj: &K,
        base: Option<&ResourceStatus>,
        new: &ResourceStatus,
    ) -> Result<K, StoreError> {
        let base_value = match base {
            Some(status) => serde_json::to_value(status)?,
            None => serde_json::json!({}),
        };
        let diff = merge_diff(&base_value, &serde_json::to_value(new)?);
        if base.is_some() && is_empty_patch(&diff) {
            return Ok(obj.clone());
        }

        let updated = self.guarded_write(obj, |stored| {
            let mut status = match stored.resource_status() {
                Some(current) => serde_json::to_value(current)?,
                None => serde_json::json!({}),
            };
            apply_merge_patch(&mut status, &diff);
            *stored.resource_status_mut() = Some(serde_json::from_value(status)?);
            Ok(())
        })?;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::elasticsearch::ElasticsearchRoleSpec;
    use crate::crd::ElasticsearchRole;

    fn role(name: &str) -> ElasticsearchRole {
        let mut role = ElasticsearchRole::new(
            name,
            ElasticsearchRoleSpec {
                target_instance: None,
                body: "{}".to_string(),
                template: None,
            },
        );
        role.metadata.namespace = Some("team-a".to_string());
        role
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let store = MemoryStore::new();
        let stored = store.insert(role("r1")).unwrap();
        store
            .update_spec("team-a", "r1", |r: &mut ElasticsearchRole| {
                r.spec.body = "{\"a\":1}".to_string();
            })
            .unwrap();

        let err = store.add_finalizer(&stored, "x/finalizer").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_finalizer_blocks_deletion_until_removed() {
        let store = MemoryStore::new();
        store.insert(role("r1")).unwrap();
        let current = store.snapshot("team-a", "r1").unwrap();
        store.add_finalizer(&current, "x/finalizer").await.unwrap();

        store.delete("team-a", "r1").unwrap();
        let deleting = store.snapshot("team-a", "r1").unwrap();
        assert!(deleting.metadata.deletion_timestamp.is_some());

        store.remove_finalizer(&deleting, "x/finalizer").await.unwrap();
        assert!(store.snapshot("team-a", "r1").is_none());
    }

    #[tokio::test]
    async fn test_patch_status_applies_diff() {
        let store = MemoryStore::new();
        let stored = store.insert(role("r1")).unwrap();
        let new = ResourceStatus {
            external_id: Some("r1".to_string()),
            observed_generation: Some(1),
            ..Default::default()
        };
        let updated = store.patch_status(&stored, None, &new).await.unwrap();
        assert_eq!(updated.status, Some(new.clone()));
        assert_eq!(store.status_writes(), 1);

        // Unchanged status is not written again
        store.patch_status(&updated, Some(&new), &new).await.unwrap();
        assert_eq!(store.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_labels() {
        let store = MemoryStore::new();
        let mut labelled = role("r1");
        labelled.metadata.labels = Some(BTreeMap::from([("team".to_string(), "a".to_string())]));
        store.insert(labelled).unwrap();
        store.insert(role("r2")).unwrap();
        let mut other = role("r3");
        other.metadata.namespace = Some("team-b".to_string());
        store.insert(other).unwrap();

        assert_eq!(store.list(Some("team-a"), None).await.unwrap().len(), 2);
        assert_eq!(store.list(None, None).await.unwrap().len(), 3);
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("team".to_string(), "a".to_string())])),
            ..Default::default()
        };
        let matched = store.list(None, Some(&selector)).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].metadata.name.as_deref(), Some("r1"));
    }
}
