//! Shared fixtures for the integration tests: scripted external services,
//! a static instance resolver and object builders.

#![allow(dead_code, reason = "Not every test binary uses every fixture")]

use async_trait::async_trait;
use kube::api::ObjectMeta;
use kube_runtime::controller::Action;
use resource_controller::controller::reconciler::{reconcile, Engine, EngineConfig};
use resource_controller::crd::elasticsearch::IndexTemplateSpec;
use resource_controller::crd::{
    IndexTemplate, ManagedResource, ResourceStatus, ResourceTemplateData,
    ResourceTemplateDataSpec, Service, TargetInstance, TemplateReference, TemplateSpec,
};
use resource_controller::external::{
    Created, ExternalError, ExternalResource, InstanceError, InstanceResolver, RecoveryStrategy,
    ResolvedInstance, ServiceClient, UnresolvedIdentityPolicy,
};
use resource_controller::store::MemoryStore;
use resource_controller::template::{NamespacePolicy, ReferenceResolver};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static RUSTLS_INIT: Once = Once::new();

/// Install the ring crypto provider once per test binary
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        let _already_installed = rustls::crypto::ring::default_provider()
            .install_default()
            .is_err();
    });
}

/// Failure to return from the next call of an operation
#[derive(Debug, Clone)]
pub enum Failure {
    Transient,
    NotFound,
    Rejected(u16, String),
    /// The resource is created, then a follow-up step fails
    Incomplete,
}

impl Failure {
    fn into_error(self, id: &str) -> ExternalError {
        match self {
            Failure::Transient => ExternalError::Transient("connection refused".to_string()),
            Failure::NotFound => ExternalError::NotFound("scripted".to_string()),
            Failure::Rejected(status, message) => ExternalError::Rejected { status, message },
            Failure::Incomplete => ExternalError::Incomplete {
                external_id: id.to_string(),
                reason: "writing credentials failed".to_string(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    resources: BTreeMap<String, Value>,
    calls: Vec<String>,
    failures: VecDeque<(String, Failure)>,
    next_id: u32,
}

/// In-memory external service with scripted failures
///
/// Name-addressed by default; `server_assigned()` makes it hand out ids the
/// way API keys do, reading the identity back from `status.externalId`.
#[derive(Debug, Default)]
pub struct FakeExternal {
    state: Mutex<FakeState>,
    server_assigned: bool,
    recovery: RecoveryStrategy,
    unresolved: UnresolvedIdentityPolicy,
}

impl FakeExternal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_assigned(
        recovery: RecoveryStrategy,
        unresolved: UnresolvedIdentityPolicy,
    ) -> Self {
        Self {
            server_assigned: true,
            recovery,
            unresolved,
            ..Self::default()
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryStrategy) -> Self {
        self.recovery = recovery;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Make the next call of `operation` fail
    pub fn fail_next(&self, operation: &str, failure: Failure) {
        self.lock().failures.push_back((operation.to_string(), failure));
    }

    pub fn resource(&self, id: &str) -> Option<Value> {
        self.lock().resources.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().resources.keys().cloned().collect()
    }

    /// Put a resource in place as if created earlier
    pub fn seed(&self, id: &str, body: Value) {
        self.lock().resources.insert(id.to_string(), body);
    }

    /// Remove a resource behind the controller's back
    pub fn remove(&self, id: &str) {
        self.lock().resources.remove(id);
    }

    /// Calls made so far, as `operation:id`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        let prefix = format!("{operation}:");
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    /// Log the call and take the failure scripted for it, if any
    fn scripted(&self, operation: &str, id: &str) -> Option<Failure> {
        let mut state = self.lock();
        state.calls.push(format!("{operation}:{id}"));
        let index = state.failures.iter().position(|(op, _)| op == operation)?;
        state.failures.remove(index).map(|(_, failure)| failure)
    }

    fn record(&self, operation: &str, id: &str) -> Result<(), ExternalError> {
        match self.scripted(operation, id) {
            Some(failure) => Err(failure.into_error(id)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<K: ManagedResource> ExternalResource<K> for FakeExternal {
    fn identity(&self, obj: &K) -> Option<String> {
        if self.server_assigned {
            obj.resource_status().and_then(|s| s.external_id.clone())
        } else {
            obj.meta().name.clone()
        }
    }

    fn recovery(&self) -> RecoveryStrategy {
        self.recovery
    }

    fn unresolved_identity(&self) -> UnresolvedIdentityPolicy {
        self.unresolved
    }

    async fn exists(&self, _: &ServiceClient, _: &K, id: &str) -> Result<bool, ExternalError> {
        self.record("exists", id)?;
        Ok(self.lock().resources.contains_key(id))
    }

    async fn create(
        &self,
        _: &ServiceClient,
        obj: &K,
        body: &Value,
    ) -> Result<Created, ExternalError> {
        let id = if self.server_assigned {
            let mut state = self.lock();
            state.next_id += 1;
            format!("key-{}", state.next_id)
        } else {
            obj.meta().name.clone().unwrap_or_default()
        };
        match self.scripted("create", &id) {
            Some(Failure::Incomplete) => {
                self.lock().resources.insert(id.clone(), body.clone());
                return Err(Failure::Incomplete.into_error(&id));
            }
            Some(failure) => return Err(failure.into_error(&id)),
            None => {}
        }
        self.lock().resources.insert(id.clone(), body.clone());
        Ok(Created {
            external_id: id,
            raw: body.clone(),
        })
    }

    async fn update(
        &self,
        _: &ServiceClient,
        _: &K,
        id: &str,
        body: &Value,
    ) -> Result<(), ExternalError> {
        self.record("update", id)?;
        let mut state = self.lock();
        match state.resources.get_mut(id) {
            Some(existing) => {
                *existing = body.clone();
                Ok(())
            }
            None => Err(ExternalError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, _: &ServiceClient, _: &K, id: &str) -> Result<(), ExternalError> {
        self.record("delete", id)?;
        match self.lock().resources.remove(id) {
            Some(_) => Ok(()),
            None => Err(ExternalError::NotFound(id.to_string())),
        }
    }
}

/// Resolves every target to one local instance
#[derive(Debug)]
pub struct StaticInstances {
    enabled: AtomicBool,
}

impl StaticInstances {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl InstanceResolver for StaticInstances {
    async fn resolve(
        &self,
        _: Service,
        target: Option<&TargetInstance>,
        namespace: &str,
    ) -> Result<ResolvedInstance, InstanceError> {
        Ok(ResolvedInstance {
            key: resource_controller::external::instance::target_key(target, namespace),
            enabled: self.enabled.load(Ordering::SeqCst),
            url: "http://127.0.0.1:9".to_string(),
            credentials: None,
            ca_certificate: None,
        })
    }
}

pub fn data_object(
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
    data: Value,
) -> ResourceTemplateData {
    let data = match data {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    ResourceTemplateData {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            labels: (!labels.is_empty()).then(|| {
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect()
            }),
            ..ObjectMeta::default()
        },
        spec: ResourceTemplateDataSpec { data },
    }
}

pub fn index_template(
    namespace: &str,
    name: &str,
    body: &str,
    references: Vec<TemplateReference>,
) -> IndexTemplate {
    let mut template = IndexTemplate::new(
        name,
        IndexTemplateSpec {
            target_instance: None,
            body: body.to_string(),
            template: (!references.is_empty()).then_some(TemplateSpec { references }),
        },
    );
    template.metadata.namespace = Some(namespace.to_string());
    template
}

/// Engine over in-memory stores with a fake external service
pub struct Harness<K: ManagedResource> {
    pub store: Arc<MemoryStore<K>>,
    pub data: Arc<MemoryStore<ResourceTemplateData>>,
    pub external: Arc<FakeExternal>,
    pub instances: Arc<StaticInstances>,
    pub engine: Arc<Engine<K>>,
}

impl<K: ManagedResource> Harness<K> {
    pub fn new(external: FakeExternal, policy: NamespacePolicy) -> Self {
        init_rustls();
        let store = Arc::new(MemoryStore::<K>::new());
        let data = Arc::new(MemoryStore::<ResourceTemplateData>::new());
        let external = Arc::new(external);
        let instances = Arc::new(StaticInstances::new());
        let engine = Engine::new(
            store.clone(),
            external.clone(),
            ReferenceResolver::new(data.clone()),
            instances.clone(),
        )
        .with_policy(policy)
        .with_config(EngineConfig::default());
        Self {
            store,
            data,
            external,
            instances,
            engine: Arc::new(engine),
        }
    }

    pub fn current(&self, obj: &K) -> Option<K> {
        let meta = obj.meta();
        self.store.snapshot(
            meta.namespace.as_deref().unwrap_or_default(),
            meta.name.as_deref().unwrap_or_default(),
        )
    }

    pub fn status(&self, obj: &K) -> ResourceStatus {
        self.current(obj)
            .and_then(|o| o.resource_status().cloned())
            .unwrap_or_default()
    }

    /// One reconciliation pass for the object `obj` identifies
    pub async fn pass(&self, obj: &K) -> Action {
        reconcile(Arc::new(obj.clone()), self.engine.clone())
            .await
            .unwrap()
    }

    /// Run passes until the engine waits for a change or asks for a delay
    pub async fn settle(&self, obj: &K) -> Action {
        for _ in 0..10 {
            let action = self.pass(obj).await;
            if action != Action::requeue(Duration::ZERO) {
                return action;
            }
        }
        panic!("{:?} did not settle", obj.meta().name);
    }
}
