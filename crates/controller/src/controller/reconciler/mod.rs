//! # Reconciler
//!
//! The generic reconciliation engine shared by every declared kind.
//!
//! Each pass re-reads the object, classifies it into a [`Phase`] and performs
//! at most one step of the lifecycle:
//!
//! | Phase              | Step                                                     |
//! |--------------------|----------------------------------------------------------|
//! | `Uninitialized`    | record `Initialized=True`, requeue                       |
//! | `PendingFinalizer` | add the finalizer, requeue                               |
//! | `Creating`         | render and create                                        |
//! | `Ready` (in sync)  | check the resource still exists, recreate when it is gone|
//! | `Ready` (stale)    | render and update                                        |
//! | `Error`            | recover with the kind's `RecoveryStrategy`               |
//! | `Deleting`         | delete externally, then release the finalizer            |
//!
//! Store conflicts abort the pass and requeue after a short delay. Failed
//! external or template steps set `Error=True` and requeue with the
//! per-object Fibonacci backoff.

mod conditions;
mod finalize;
mod types;
mod upsert;

pub use conditions::set_condition;
pub use types::{BackoffState, Engine, EngineConfig, EngineError, Phase};
pub use upsert::body_hash;

use crate::crd::{
    ManagedResource, CONDITION_ERROR, CONDITION_INITIALIZED, CONDITION_READY, STATUS_TRUE,
};
use crate::observability;
use crate::store::{has_finalizer, object_key};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, Instrument};

/// Lifecycle phase of `obj`
#[must_use]
pub fn phase<K: ManagedResource>(obj: &K) -> Phase {
    if obj.meta().deletion_timestamp.is_some() {
        return Phase::Deleting;
    }
    let status = obj.resource_status();
    if status.and_then(|s| s.condition(CONDITION_INITIALIZED)).is_none() {
        return Phase::Uninitialized;
    }
    if !has_finalizer(obj, K::SERVICE.finalizer()) {
        return Phase::PendingFinalizer;
    }
    let ready = status.is_some_and(|s| s.is_true(CONDITION_READY));
    let errored = status.is_some_and(|s| s.is_true(CONDITION_ERROR));
    match (ready, errored) {
        (true, _) => Phase::Ready,
        (false, true) => Phase::Error,
        (false, false) => Phase::Creating,
    }
}

/// Reconcile one declared object
///
/// `obj` only identifies the object; the current state is always re-read from
/// the store.
pub async fn reconcile<K: ManagedResource>(
    obj: Arc<K>,
    engine: Arc<Engine<K>>,
) -> Result<Action, EngineError> {
    let kind = K::kind_name();
    let namespace = obj.meta().namespace.clone().unwrap_or_default();
    let name = obj.meta().name.clone().unwrap_or_default();

    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.reconcile",
        resource.kind = %kind,
        resource.name = %name,
        resource.namespace = %namespace,
        resource.generation = obj.meta().generation.unwrap_or_default()
    );

    async move {
        let start = Instant::now();
        observability::metrics::increment_reconciliations(&kind);

        let result = match engine.store.get(&namespace, &name).await {
            Ok(Some(current)) => engine.reconcile_object(&current).await,
            Ok(None) => {
                debug!("{} {}/{} no longer exists", kind, namespace, name);
                engine.reset_backoff(&format!("{namespace}/{name}"));
                Ok(Action::await_change())
            }
            Err(e) => Err(e.into()),
        };
        observability::metrics::observe_reconciliation_duration(
            &kind,
            start.elapsed().as_secs_f64(),
        );

        match result {
            Err(e) if e.is_conflict() => {
                info!(
                    "Conflict writing {} {}/{}, requeueing in {}s",
                    kind,
                    namespace,
                    name,
                    engine.config.finalizer_requeue.as_secs()
                );
                observability::metrics::increment_requeues_total("conflict");
                Ok(Action::requeue(engine.config.finalizer_requeue))
            }
            other => other,
        }
    }
    .instrument(span)
    .await
}

impl<K: ManagedResource> Engine<K> {
    /// Perform the step the object's phase calls for
    pub async fn reconcile_object(&self, obj: &K) -> Result<Action, EngineError> {
        let phase = phase(obj);
        debug!("Reconciling {} in phase {:?}", object_key(obj), phase);
        match phase {
            Phase::Deleting => self.finalize(obj).await,
            Phase::Uninitialized => self.initialize(obj).await,
            Phase::PendingFinalizer => self.ensure_finalizer(obj).await,
            Phase::Creating | Phase::Ready | Phase::Error => self.apply(obj, phase).await,
        }
    }

    async fn initialize(&self, obj: &K) -> Result<Action, EngineError> {
        let base = obj.resource_status();
        let mut status = base.cloned().unwrap_or_default();
        set_condition(
            &mut status,
            CONDITION_INITIALIZED,
            STATUS_TRUE,
            "Initialized",
            "Resource observed by the controller",
            obj.meta().generation,
        );
        self.store.patch_status(obj, base, &status).await?;
        Ok(Action::requeue(Duration::ZERO))
    }

    async fn ensure_finalizer(&self, obj: &K) -> Result<Action, EngineError> {
        let token = K::SERVICE.finalizer();
        self.store.add_finalizer(obj, token).await?;
        observability::metrics::increment_finalizer_operations(&K::kind_name(), "add");
        debug!("Added finalizer {} to {}", token, object_key(obj));
        Ok(Action::requeue(Duration::ZERO))
    }
}
