//! Create, update and drift handling for live objects.

use super::conditions::set_condition;
use super::types::{Engine, EngineError, Phase};
use crate::constants::IDENTITY_WRITE_ATTEMPTS;
use crate::crd::{
    ManagedResource, ResourceStatus, CONDITION_ERROR, CONDITION_READY, STATUS_FALSE, STATUS_TRUE,
};
use crate::external::{ExternalError, RecoveryStrategy, ServiceClient};
use crate::observability::metrics;
use crate::store::object_key;
use kube_runtime::controller::Action;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Hex SHA-256 of a canonical body
#[must_use]
pub fn body_hash(canonical: &str) -> String {
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

fn in_sync(status: &ResourceStatus, generation: Option<i64>, hash: &str) -> bool {
    status.is_true(CONDITION_READY)
        && !status.is_true(CONDITION_ERROR)
        && status.observed_generation == generation
        && status.applied_hash.as_deref() == Some(hash)
}

impl<K: ManagedResource> Engine<K> {
    /// Resolve references and render the object's body
    ///
    /// Returns the parsed body and the hash of its canonical serialization.
    pub async fn render_body(&self, obj: &K) -> Result<(Value, String), EngineError> {
        let namespace = obj.meta().namespace.as_deref().unwrap_or_default();
        let data = if obj.references().is_empty() {
            Vec::new()
        } else {
            self.resolver
                .resolve(obj.references(), namespace, self.policy)
                .await?
        };
        let text = self.renderer.render(obj.body_template(), &data, namespace)?;

        let body: Value = if text.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&text).map_err(|e| EngineError::InvalidBody(e.to_string()))?
        };
        let canonical =
            serde_json::to_string(&body).map_err(|e| EngineError::InvalidBody(e.to_string()))?;
        Ok((body, body_hash(&canonical)))
    }

    pub(super) async fn apply(&self, obj: &K, phase: Phase) -> Result<Action, EngineError> {
        let namespace = obj.meta().namespace.as_deref().unwrap_or_default();
        let instance = match self
            .instances
            .resolve(K::SERVICE, obj.target_instance(), namespace)
            .await
        {
            Ok(instance) => instance,
            Err(e) => return self.record_failure(obj, e.into()).await,
        };
        if !instance.enabled {
            info!(
                "Target instance {} is disabled, skipping {}",
                instance.key,
                object_key(obj)
            );
            return Ok(Action::await_change());
        }

        let (body, hash) = match self.render_body(obj).await {
            Ok(rendered) => rendered,
            Err(e) => return self.record_failure(obj, e).await,
        };
        let client = match instance.client() {
            Ok(client) => client,
            Err(e) => return self.record_failure(obj, e.into()).await,
        };

        let status = obj.resource_status().cloned().unwrap_or_default();
        let result = match phase {
            Phase::Ready if in_sync(&status, obj.meta().generation, &hash) => {
                match self.check_exists(&client, obj).await {
                    Ok(true) => {
                        debug!("{} is in sync", object_key(obj));
                        return Ok(Action::await_change());
                    }
                    Ok(false) => {
                        warn!(
                            "External resource for {} is missing, recreating",
                            object_key(obj)
                        );
                        self.create(&client, obj, &body).await
                    }
                    Err(e) => Err(e),
                }
            }
            Phase::Ready => self.update_or_create(&client, obj, &body).await,
            Phase::Error => self.recover(&client, obj, &body).await,
            Phase::Creating if status.external_id.is_some() => {
                debug!(
                    "{} already has an external identity, repairing",
                    object_key(obj)
                );
                self.repair(&client, obj, &body).await
            }
            _ => self.create(&client, obj, &body).await,
        };

        match result {
            Ok(external_id) => self.record_success(obj, external_id, hash).await,
            Err(e) => self.record_failure(obj, e).await,
        }
    }

    async fn check_exists(&self, client: &ServiceClient, obj: &K) -> Result<bool, EngineError> {
        let Some(id) = self.external.identity(obj) else {
            return Ok(false);
        };
        let exists = self.external.exists(client, obj, &id).await;
        self.observe("exists", &exists);
        Ok(exists?)
    }

    async fn create(
        &self,
        client: &ServiceClient,
        obj: &K,
        body: &Value,
    ) -> Result<String, EngineError> {
        let created = self.external.create(client, obj, body).await;
        self.observe("create", &created);
        let created = created?;
        info!(
            "Created external resource {} for {}",
            created.external_id,
            object_key(obj)
        );
        Ok(created.external_id)
    }

    async fn update_or_create(
        &self,
        client: &ServiceClient,
        obj: &K,
        body: &Value,
    ) -> Result<String, EngineError> {
        let Some(id) = self.external.identity(obj) else {
            return self.create(client, obj, body).await;
        };
        let updated = self.external.update(client, obj, &id, body).await;
        self.observe("update", &updated);
        match updated {
            Ok(()) => {
                info!("Updated external resource {} for {}", id, object_key(obj));
                Ok(id)
            }
            Err(ExternalError::NotFound(_)) => {
                warn!("External resource {} vanished before update, recreating", id);
                self.create(client, obj, body).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recover(
        &self,
        client: &ServiceClient,
        obj: &K,
        body: &Value,
    ) -> Result<String, EngineError> {
        match self.external.recovery() {
            RecoveryStrategy::Repair => self.repair(client, obj, body).await,
            RecoveryStrategy::Recreate => {
                if let Some(id) = self.external.identity(obj) {
                    let deleted = self.external.delete(client, obj, &id).await;
                    self.observe("delete", &deleted);
                    match deleted {
                        Ok(()) | Err(ExternalError::NotFound(_)) => {
                            debug!("Discarded external resource {} before recreating", id);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                self.create(client, obj, body).await
            }
        }
    }

    /// Update the recorded resource when it exists, create it otherwise
    async fn repair(
        &self,
        client: &ServiceClient,
        obj: &K,
        body: &Value,
    ) -> Result<String, EngineError> {
        if self.check_exists(client, obj).await? {
            self.update_or_create(client, obj, body).await
        } else {
            self.create(client, obj, body).await
        }
    }

    pub(super) fn observe<T>(&self, operation: &str, result: &Result<T, ExternalError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(ExternalError::NotFound(_)) => "not_found",
            Err(_) => "failure",
        };
        metrics::record_external_operation(&K::kind_name(), operation, outcome);
    }

    async fn record_success(
        &self,
        obj: &K,
        external_id: String,
        hash: String,
    ) -> Result<Action, EngineError> {
        let generation = obj.meta().generation;
        let base = obj.resource_status();
        let mut status = base.cloned().unwrap_or_default();
        status.observed_generation = generation;
        status.applied_hash = Some(hash);
        status.external_id = Some(external_id);
        status.last_reconcile_time =
            Some(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
        status.unresolved_delete_attempts = None;
        set_condition(
            &mut status,
            CONDITION_READY,
            STATUS_TRUE,
            "Applied",
            "External resource is in sync",
            generation,
        );
        if status.condition(CONDITION_ERROR).is_some() {
            set_condition(&mut status, CONDITION_ERROR, STATUS_FALSE, "Applied", "", generation);
        }
        self.write_status(obj, base, &status).await?;

        let key = object_key(obj);
        if self.reset_backoff(&key) {
            info!("{} recovered, backoff reset", key);
        }
        Ok(Action::await_change())
    }

    /// Record a failed attempt on the object and schedule a retry
    ///
    /// Store errors are returned as-is; everything else becomes `Error=True`
    /// and a backoff requeue. An unchanged status is not rewritten. When the
    /// external resource was created before the failure, its identity is
    /// recorded with the condition.
    pub(super) async fn record_failure(
        &self,
        obj: &K,
        error: EngineError,
    ) -> Result<Action, EngineError> {
        if matches!(error, EngineError::Store(_)) {
            return Err(error);
        }
        let kind = K::kind_name();
        let key = object_key(obj);
        metrics::increment_reconciliation_errors(&kind);
        if error.is_template_failure() {
            metrics::increment_render_failures(&kind);
        }

        let base = obj.resource_status();
        let mut status = base.cloned().unwrap_or_default();
        set_condition(
            &mut status,
            CONDITION_ERROR,
            STATUS_TRUE,
            error.reason(),
            &error.condition_message(),
            obj.meta().generation,
        );
        if let Some(external_id) = error.created_identity() {
            status.external_id = Some(external_id.to_string());
        }
        self.write_status(obj, base, &status).await?;

        let delay = self.next_backoff(&key);
        warn!(
            "Reconciliation of {} {} failed ({}): {}; retrying in {}s",
            kind,
            key,
            error.reason(),
            error,
            delay.as_secs()
        );
        metrics::increment_requeues_total("error-backoff");
        Ok(Action::requeue(delay))
    }

    /// Patch the status computed for `obj`
    ///
    /// A conflict is returned to the caller, but a newly minted external
    /// identity in `status` is first written on its own to the latest copy of
    /// the object, so the next pass does not create the resource again.
    async fn write_status(
        &self,
        obj: &K,
        base: Option<&ResourceStatus>,
        status: &ResourceStatus,
    ) -> Result<(), EngineError> {
        match self.store.patch_status(obj, base, status).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_conflict() => {
                let recorded = base.and_then(|s| s.external_id.as_deref());
                if let Some(external_id) = status.external_id.as_deref() {
                    if recorded != Some(external_id) {
                        self.persist_identity(obj, external_id).await?;
                    }
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist_identity(&self, obj: &K, external_id: &str) -> Result<(), EngineError> {
        let namespace = obj.meta().namespace.as_deref().unwrap_or_default();
        let name = obj.meta().name.as_deref().unwrap_or_default();
        for _ in 0..IDENTITY_WRITE_ATTEMPTS {
            let Some(current) = self.store.get(namespace, name).await? else {
                return Ok(());
            };
            let base = current.resource_status();
            if base.and_then(|s| s.external_id.as_deref()) == Some(external_id) {
                return Ok(());
            }
            let mut status = base.cloned().unwrap_or_default();
            status.external_id = Some(external_id.to_string());
            match self.store.patch_status(&current, base, &status).await {
                Ok(_) => {
                    info!(
                        "Recorded external identity {} for {}/{} after a status conflict",
                        external_id, namespace, name
                    );
                    return Ok(());
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        warn!(
            "Could not record external identity {} for {}/{}",
            external_id, namespace, name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_hash_is_hex_sha256() {
        let hash = body_hash("{}");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_in_sync_requires_matching_generation_and_hash() {
        let mut status = ResourceStatus::default();
        set_condition(&mut status, CONDITION_READY, STATUS_TRUE, "Applied", "", Some(2));
        status.observed_generation = Some(2);
        status.applied_hash = Some("abc".to_string());

        assert!(in_sync(&status, Some(2), "abc"));
        assert!(!in_sync(&status, Some(3), "abc"));
        assert!(!in_sync(&status, Some(2), "def"));

        set_condition(&mut status, CONDITION_ERROR, STATUS_TRUE, "Rejected", "", Some(2));
        assert!(!in_sync(&status, Some(2), "abc"));
    }
}
