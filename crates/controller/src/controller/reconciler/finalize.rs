//! Deletion: remove the external resource, then release the finalizer.
//!
//! The finalizer is only removed after the service confirmed the deletion (or
//! reported the resource as already gone). Kinds whose identity is assigned
//! by the service may release it after a bounded number of attempts when the
//! identity was never recorded.

use super::conditions::set_condition;
use super::types::{Engine, EngineError};
use crate::crd::{ManagedResource, CONDITION_ERROR, STATUS_TRUE};
use crate::external::{ExternalError, UnresolvedIdentityPolicy};
use crate::observability::metrics;
use crate::store::{has_finalizer, object_key};
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

impl<K: ManagedResource> Engine<K> {
    pub(super) async fn finalize(&self, obj: &K) -> Result<Action, EngineError> {
        let key = object_key(obj);
        if !has_finalizer(obj, K::SERVICE.finalizer()) {
            debug!("{} is deleting without our finalizer", key);
            return Ok(Action::await_change());
        }

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
                "Target instance {} is disabled, keeping finalizer on {}",
                instance.key, key
            );
            return Ok(Action::await_change());
        }

        let Some(id) = self.external.identity(obj) else {
            return self.finalize_unresolved(obj).await;
        };
        let client = match instance.client() {
            Ok(client) => client,
            Err(e) => return self.record_failure(obj, e.into()).await,
        };

        let deleted = self.external.delete(&client, obj, &id).await;
        self.observe("delete", &deleted);
        match deleted {
            Ok(()) => info!("Deleted external resource {} for {}", id, key),
            Err(ExternalError::NotFound(_)) => {
                info!("External resource {} for {} was already gone", id, key);
            }
            Err(e) => return self.record_failure(obj, e.into()).await,
        }
        self.release(obj).await
    }

    async fn release(&self, obj: &K) -> Result<Action, EngineError> {
        self.store
            .remove_finalizer(obj, K::SERVICE.finalizer())
            .await?;
        metrics::increment_finalizer_operations(&K::kind_name(), "remove");
        self.reset_backoff(&object_key(obj));
        debug!("Released finalizer on {}", object_key(obj));
        Ok(Action::await_change())
    }

    async fn finalize_unresolved(&self, obj: &K) -> Result<Action, EngineError> {
        let key = object_key(obj);
        match self.external.unresolved_identity() {
            UnresolvedIdentityPolicy::Hold => {
                self.record_failure(obj, EngineError::UnresolvedIdentity)
                    .await
            }
            UnresolvedIdentityPolicy::ReleaseAfter(limit) => {
                let base = obj.resource_status();
                let attempts = base
                    .and_then(|s| s.unresolved_delete_attempts)
                    .unwrap_or(0)
                    + 1;
                if attempts >= limit {
                    warn!(
                        "External identity of {} unknown after {} attempts, releasing finalizer",
                        key, attempts
                    );
                    return self.release(obj).await;
                }

                let mut status = base.cloned().unwrap_or_default();
                status.unresolved_delete_attempts = Some(attempts);
                set_condition(
                    &mut status,
                    CONDITION_ERROR,
                    STATUS_TRUE,
                    EngineError::UnresolvedIdentity.reason(),
                    &format!("External identity unknown, delete attempt {attempts} of {limit}"),
                    obj.meta().generation,
                );
                self.store.patch_status(obj, base, &status).await?;
                metrics::increment_reconciliation_errors(&K::kind_name());
                let delay = self.next_backoff(&key);
                warn!(
                    "External identity of {} unknown (attempt {} of {}), retrying in {}s",
                    key,
                    attempts,
                    limit,
                    delay.as_secs()
                );
                Ok(Action::requeue(delay))
            }
        }
    }
}
