//! # Watch Loop
//!
//! One kube-runtime `Controller` per enabled kind. Each controller watches its
//! declared objects, plus `ResourceTemplateData` and instance objects mapped
//! back to dependents through the indexer.

use crate::config::{ControllerConfig, SharedControllerConfig};
use crate::controller::indexer::{DependencyIndex, KindFilter, ReflectorSource};
use crate::controller::kinds;
use crate::controller::reconciler::{reconcile, Engine};
use crate::crd::{
    ElasticsearchInstance, KibanaInstance, ManagedResource, ResourceTemplateData, Service,
};
use crate::external::{elasticsearch, kibana, ExternalResource};
use crate::observability;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::runtime::initialization::RuntimeContext;
use crate::server::ServerState;
use crate::store::KubeStore;
use crate::template::ReferenceResolver;
use futures::future::BoxFuture;
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{controller, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Run every enabled controller until shutdown
pub async fn run_watch_loop(
    context: Arc<RuntimeContext>,
    server_state: Arc<ServerState>,
    controller_config: SharedControllerConfig,
) -> Result<(), anyhow::Error> {
    let shutdown_server_state = server_state.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        }
        shutdown_server_state.set_ready(false);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    let config = controller_config.read().await.clone();
    let secrets = context.secrets.clone();
    let mut launcher = Launcher {
        context,
        server_state,
        controller_config,
        config,
        controllers: Vec::new(),
    };

    launcher.add(Arc::new(elasticsearch::role()));
    launcher.add(Arc::new(elasticsearch::UserResource::new(secrets.clone())));
    let apikey_recovery = launcher.config.apikey_recovery;
    launcher.add(Arc::new(elasticsearch::ApiKeyResource::new(
        secrets,
        apikey_recovery,
    )));
    launcher.add(Arc::new(elasticsearch::index_template()));
    launcher.add(Arc::new(elasticsearch::component_template()));
    launcher.add(Arc::new(elasticsearch::index_lifecycle_policy()));
    launcher.add(Arc::new(elasticsearch::snapshot_lifecycle_policy()));
    launcher.add(Arc::new(elasticsearch::snapshot_repository()));
    launcher.add(Arc::new(elasticsearch::ingest_pipeline()));
    launcher.add(Arc::new(kibana::role()));
    launcher.add(Arc::new(kibana::space()));
    launcher.add(Arc::new(kibana::saved_object()));
    launcher.add(Arc::new(kibana::data_view()));

    if launcher.controllers.is_empty() {
        warn!("No kinds enabled, nothing to reconcile");
    } else {
        info!("Starting {} controllers", launcher.controllers.len());
    }
    futures::future::join_all(launcher.controllers).await;

    info!("Controller stopped gracefully");
    Ok(())
}

struct Launcher {
    context: Arc<RuntimeContext>,
    server_state: Arc<ServerState>,
    controller_config: SharedControllerConfig,
    config: ControllerConfig,
    controllers: Vec<BoxFuture<'static, ()>>,
}

impl Launcher {
    fn add<K: ManagedResource>(&mut self, external: Arc<dyn ExternalResource<K>>) {
        let kind = K::kind_name();
        if !self.config.kind_enabled(&kind) {
            info!("Controller for {} is disabled", kind);
            return;
        }
        let policy = self
            .config
            .reference_policy(&kind, kinds::default_policy(&kind));
        let engine = Engine::new(
            Arc::new(KubeStore::<K>::new(self.context.client.clone())),
            external,
            ReferenceResolver::new(self.context.data_store.clone()),
            self.context.instances.clone(),
        )
        .with_policy(policy)
        .with_config(self.config.engine_config());
        debug!("Prepared controller for {} ({:?})", kind, engine);

        self.controllers.push(Box::pin(run_controller(
            self.context.clone(),
            Arc::new(engine),
            self.server_state.clone(),
            self.controller_config.clone(),
        )));
    }
}

/// Run the controller for `K`, restarting its watch stream until shutdown
async fn run_controller<K: ManagedResource>(
    context: Arc<RuntimeContext>,
    engine: Arc<Engine<K>>,
    server_state: Arc<ServerState>,
    controller_config: SharedControllerConfig,
) {
    let kind = K::kind_name();
    let api: Api<K> = Api::all(context.client.clone());
    check_queryable(&api, &kind).await;

    let backoff_start_ms = controller_config.read().await.backoff_start_ms;
    let backoff_duration_ms = Arc::new(AtomicU64::new(backoff_start_ms));

    loop {
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop for {}", kind);
            break;
        }

        let config = controller_config.read().await.clone();
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            resource.kind = %kind
        );

        let concurrency =
            controller::Config::default().concurrency(config.max_concurrent_reconciliations);
        let controller = Controller::new(api.clone(), watcher::Config::default().any_semantic())
            .with_config(concurrency);
        context.registry.register(Arc::new(ReflectorSource::new(
            engine.policy,
            controller.store(),
        )));

        let data_index = context.index.clone();
        let controller = controller.watches(
            Api::<ResourceTemplateData>::all(context.client.clone()),
            watcher::Config::default(),
            move |data| data_dependents::<K>(&data_index, &data),
        );
        let instance_index = context.index.clone();
        let controller = match K::SERVICE {
            Service::Elasticsearch => controller.watches(
                Api::<ElasticsearchInstance>::all(context.client.clone()),
                watcher::Config::default(),
                move |instance| instance_dependents::<K, _>(&instance_index, &instance),
            ),
            Service::Kibana => controller.watches(
                Api::<KibanaInstance>::all(context.client.clone()),
                watcher::Config::default(),
                move |instance| instance_dependents::<K, _>(&instance_index, &instance),
            ),
        };

        info!(parent: &watch_span, "Starting controller watch loop for {}", kind);
        let backoff = backoff_duration_ms.clone();
        let stream_config = config.clone();
        let stream_kind = kind.clone();
        controller
            .shutdown_on_signal()
            .run(reconcile::<K>, handle_reconciliation_error::<K>, engine.clone())
            .filter_map(move |x| {
                let backoff = backoff.clone();
                let config = stream_config.clone();
                let kind = stream_kind.clone();
                async move {
                    match &x {
                        Ok((object, _action)) => {
                            backoff.store(config.backoff_start_ms, Ordering::Relaxed);
                            debug!("watch.event.success {}", object.name);
                            Some(x)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &kind,
                                &error_string,
                                &backoff,
                                config.backoff_max_ms,
                                config.watch_restart_delay_secs,
                            )
                            .await
                            .map(|()| x)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .await;

        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop for {}", kind);
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream for {} ended, restarting in {} seconds...",
            kind,
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }
}

async fn check_queryable<K: ManagedResource>(api: &Api<K>, kind: &str) {
    match api.list(&ListParams::default().limit(1)).await {
        Ok(_) => debug!("{} is queryable", kind),
        Err(e) => {
            error!("{} is not queryable; {:?}. Is the CRD installed?", kind, e);
            error!("Installation: crdgen | kubectl apply -f -");
            warn!("Continuing despite the failed check, the watch will retry");
        }
    }
}

/// Declared objects of kind `K` to requeue after `data` changed
fn data_dependents<K: ManagedResource>(
    index: &DependencyIndex,
    data: &ResourceTemplateData,
) -> Vec<ObjectRef<K>> {
    let found = index.find_dependents(&KindFilter::only(&K::kind_name()), data);
    if !found.is_empty() {
        debug!(
            "ResourceTemplateData {}/{} changed, requeueing {} {} object(s)",
            data.metadata.namespace.as_deref().unwrap_or_default(),
            data.metadata.name.as_deref().unwrap_or_default(),
            found.len(),
            K::kind_name()
        );
        observability::metrics::increment_dependents_requeued("template-data", found.len());
    }
    found
        .into_iter()
        .map(|d| ObjectRef::new(&d.name).within(&d.namespace))
        .collect()
}

/// Declared objects of kind `K` to requeue after an instance object changed
fn instance_dependents<K: ManagedResource, I: kube::Resource>(
    index: &DependencyIndex,
    instance: &I,
) -> Vec<ObjectRef<K>> {
    let key = format!(
        "{}/{}",
        instance.meta().namespace.as_deref().unwrap_or_default(),
        instance.meta().name.as_deref().unwrap_or_default()
    );
    let found = index.find_by_instance(&KindFilter::only(&K::kind_name()), &key);
    if !found.is_empty() {
        debug!(
            "Instance {} changed, requeueing {} {} object(s)",
            key,
            found.len(),
            K::kind_name()
        );
        observability::metrics::increment_dependents_requeued("instance", found.len());
    }
    found
        .into_iter()
        .map(|d| ObjectRef::new(&d.name).within(&d.namespace))
        .collect()
}
