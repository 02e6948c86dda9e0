//! # Types
//!
//! Core types for the reconciliation engine.

use crate::constants::{
    DEFAULT_ERROR_REQUEUE_MAX_SECS, DEFAULT_ERROR_REQUEUE_SECS, DEFAULT_FINALIZER_REQUEUE_SECS,
};
use crate::controller::backoff::FibonacciBackoff;
use crate::crd::ManagedResource;
use crate::external::{ExternalError, ExternalResource, InstanceError, InstanceResolver};
use crate::store::{DeclaredObjectStore, StoreError};
use crate::template::{BodyRenderer, NamespacePolicy, ReferenceResolver, RenderError, ResolveError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("template resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("template rendering failed: {0}")]
    Render(#[from] RenderError),
    #[error("rendered body is not valid JSON: {0}")]
    InvalidBody(String),
    #[error("target instance unavailable: {0}")]
    Instance(#[from] InstanceError),
    #[error("external request failed: {0}")]
    External(#[from] ExternalError),
    #[error("external identity of the resource is unknown")]
    UnresolvedIdentity,
}

impl EngineError {
    /// Condition reason recorded for this error
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::Store(_) => "StoreError",
            EngineError::Resolve(_) => "TemplateResolutionFailed",
            EngineError::Render(_) | EngineError::InvalidBody(_) => "TemplateRenderFailed",
            EngineError::Instance(_) => "InstanceUnavailable",
            EngineError::External(ExternalError::Rejected { .. }) => "Rejected",
            EngineError::External(ExternalError::Secret(_)) => "SecretUnavailable",
            EngineError::External(ExternalError::Configuration(_)) => "ConfigurationError",
            EngineError::External(ExternalError::Incomplete { .. }) => "Incomplete",
            EngineError::External(_) => "ExternalError",
            EngineError::UnresolvedIdentity => "UnresolvedIdentity",
        }
    }

    /// Whether the failure comes from template resolution or rendering
    #[must_use]
    pub fn is_template_failure(&self) -> bool {
        matches!(
            self,
            EngineError::Resolve(_) | EngineError::Render(_) | EngineError::InvalidBody(_)
        )
    }

    /// Message recorded in the Error condition; rejections are kept verbatim
    #[must_use]
    pub fn condition_message(&self) -> String {
        match self {
            EngineError::External(ExternalError::Rejected { message, .. }) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Identity of an external resource created before the failure
    #[must_use]
    pub fn created_identity(&self) -> Option<&str> {
        match self {
            EngineError::External(e) => e.created_identity(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_conflict())
    }
}

/// Requeue timings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay after a finalizer or status conflict
    pub finalizer_requeue: Duration,
    /// First delay after a failed attempt
    pub error_requeue_secs: u64,
    /// Cap for the Fibonacci sequence
    pub error_requeue_max_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            finalizer_requeue: Duration::from_secs(DEFAULT_FINALIZER_REQUEUE_SECS),
            error_requeue_secs: DEFAULT_ERROR_REQUEUE_SECS,
            error_requeue_max_secs: DEFAULT_ERROR_REQUEUE_MAX_SECS,
        }
    }
}

/// Backoff state for a specific resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            backoff: FibonacciBackoff::new(
                config.error_requeue_secs,
                config.error_requeue_max_secs,
            ),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Where a declared object stands in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No `Initialized` condition yet
    Uninitialized,
    /// Not deleting and the finalizer is absent
    PendingFinalizer,
    /// Finalizer present, neither Ready nor Error recorded
    Creating,
    /// `Ready=True`; whether it is in sync depends on the rendered body
    Ready,
    /// `Error=True` and `Ready` is not `True`
    Error,
    /// `deletionTimestamp` set
    Deleting,
}

/// Reconciliation context for one declared kind
pub struct Engine<K: ManagedResource> {
    pub store: Arc<dyn DeclaredObjectStore<K>>,
    pub external: Arc<dyn ExternalResource<K>>,
    pub resolver: ReferenceResolver,
    pub renderer: Arc<BodyRenderer>,
    pub instances: Arc<dyn InstanceResolver>,
    pub policy: NamespacePolicy,
    pub config: EngineConfig,
    /// Backoff state per resource (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl<K: ManagedResource> std::fmt::Debug for Engine<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("kind", &K::kind_name())
            .field("policy", &self.policy)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<K: ManagedResource> Engine<K> {
    #[must_use]
    pub fn new(
        store: Arc<dyn DeclaredObjectStore<K>>,
        external: Arc<dyn ExternalResource<K>>,
        resolver: ReferenceResolver,
        instances: Arc<dyn InstanceResolver>,
    ) -> Self {
        Self {
            store,
            external,
            resolver,
            renderer: Arc::new(BodyRenderer::new()),
            instances,
            policy: NamespacePolicy::default(),
            config: EngineConfig::default(),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: NamespacePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Next retry delay for `key`, advancing its Fibonacci sequence
    pub fn next_backoff(&self, key: &str) -> Duration {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(key.to_string())
                    .or_insert_with(|| BackoffState::new(&self.config));
                state.increment_error();
                state.backoff.next_backoff()
            }
            Err(_) => Duration::from_secs(self.config.error_requeue_secs),
        }
    }

    /// Forget the failure history of `key`; returns whether it was backing off
    pub fn reset_backoff(&self, key: &str) -> bool {
        match self.backoff_states.lock() {
            Ok(mut states) => states.remove(key).is_some_and(|s| s.error_count > 0),
            Err(_) => false,
        }
    }
}
