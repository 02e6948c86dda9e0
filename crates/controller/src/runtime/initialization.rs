//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server
//! startup, Kubernetes client and the shared runtime context.

use crate::config::{create_shared_config, SharedControllerConfig};
use crate::controller::indexer::{DependencyIndex, KindRegistry};
use crate::crd::{ElasticsearchInstance, KibanaInstance, ResourceTemplateData};
use crate::external::{InstanceResolver, StoreInstanceResolver};
use crate::observability;
use crate::server::{start_server, ServerState};
use crate::store::{KubeSecretStore, KubeStore, ObjectStore, SecretStore};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Handles shared by every per-kind controller
pub struct RuntimeContext {
    pub client: Client,
    pub secrets: Arc<dyn SecretStore>,
    pub data_store: Arc<dyn ObjectStore<ResourceTemplateData>>,
    pub instances: Arc<dyn InstanceResolver>,
    pub registry: Arc<KindRegistry>,
    pub index: DependencyIndex,
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Initialization result containing all necessary components for the controller
#[derive(Debug)]
pub struct InitializationResult {
    pub context: Arc<RuntimeContext>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub controller_config: SharedControllerConfig,
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Stores, instance resolver and kind registry
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resource_controller=info".into()),
        )
        .init();

    if !provider_installed {
        warn!("A rustls crypto provider was already installed, keeping it");
    }

    info!("Starting resource controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let controller_config = create_shared_config();
    let config = controller_config.read().await.clone();

    let server_state_clone = server_state.clone();
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(
        &server_state,
        &server_handle,
        Duration::from_secs(config.server_startup_timeout_secs),
        Duration::from_millis(config.server_poll_interval_ms),
    )
    .await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let secrets: Arc<dyn SecretStore> = Arc::new(KubeSecretStore::new(client.clone()));
    let instances: Arc<dyn InstanceResolver> = Arc::new(StoreInstanceResolver::new(
        Arc::new(KubeStore::<ElasticsearchInstance>::new(client.clone())),
        Arc::new(KubeStore::<KibanaInstance>::new(client.clone())),
        secrets.clone(),
        config.default_elasticsearch.clone(),
        config.default_kibana.clone(),
    ));
    let registry = Arc::new(KindRegistry::new());

    info!(
        "Default Elasticsearch instance: {} (enabled: {}), default Kibana instance: {} (enabled: {})",
        config.default_elasticsearch.url,
        config.default_elasticsearch.enabled,
        config.default_kibana.url,
        config.default_kibana.enabled
    );
    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        context: Arc::new(RuntimeContext {
            data_store: Arc::new(KubeStore::<ResourceTemplateData>::new(client.clone())),
            client,
            secrets,
            instances,
            index: DependencyIndex::new(registry.clone()),
            registry,
        }),
        server_state,
        controller_config,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    startup_timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
