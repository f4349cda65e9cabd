//! # Initialization
//!
//! Controller startup: rustls, tracing, metrics, the probe server, the Kubernetes
//! client, reflector caches and the reconciler context.

use crate::broker::KubeBrokerClientFactory;
use crate::cluster::{KubeEventRecorder, KubeObjectStore, ObjectStore, ReflectorCache};
use crate::config::{self, ServerConfig};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::{Binding, Instance};
use crate::observability;
use anyhow::{Context, Result};
use futures::StreamExt;
use kube::runtime::reflector::{self, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    /// Bindings across all namespaces
    pub bindings: Api<Binding>,
    /// Instances across all namespaces, watched to requeue dependent Bindings
    pub instances: Api<Instance>,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
}

impl Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("reconciler", &self.reconciler)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
#[allow(
    clippy::missing_errors_doc,
    reason = "Fails when metrics, the probe server, the cluster client or the caches cannot start"
)]
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before any rustls client is built
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "service_binding_controller=info".into()),
        )
        .init();

    if !provider_installed {
        debug!("rustls crypto provider was already installed");
    }

    info!(
        "Starting Service Binding Controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let (controller_config, server_config) = config::load_config();
    info!(
        controller = %controller_config.controller_name,
        propagate_transient_failures = controller_config.propagate_transient_failures,
        resync_secs = controller_config.resync_interval_secs,
        "Loaded configuration"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let cache = ReflectorCache::new(
        spawn_reflector(Api::all(client.clone()), "Instance"),
        spawn_reflector(Api::all(client.clone()), "ServiceClass"),
        spawn_reflector(Api::all(client.clone()), "Broker"),
    );
    info!("Waiting for Instance, ServiceClass and Broker caches to sync...");
    cache
        .wait_until_ready()
        .await
        .context("Reflector caches stopped before their initial sync")?;
    info!("Caches synced");

    let store: Arc<dyn ObjectStore> = Arc::new(KubeObjectStore::new(
        client.clone(),
        &controller_config.controller_name,
    ));
    let brokers = KubeBrokerClientFactory::new(
        Arc::clone(&store),
        controller_config.broker_request_timeout(),
    );
    let recorder = KubeEventRecorder::new(client.clone(), &controller_config.controller_name);

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(cache),
        store,
        Arc::new(brokers),
        Arc::new(recorder),
        controller_config,
    ));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        bindings: Api::all(client.clone()),
        instances: Api::all(client.clone()),
        client,
        reconciler,
        server_state,
    })
}

/// Keep a reflector store filled from a cluster-wide watch
fn spawn_reflector<K>(api: Api<K>, kind: &'static str) -> Store<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector::reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .touched_objects();

    tokio::spawn(async move {
        stream
            .for_each(|event| async move {
                if let Err(e) = event {
                    warn!(kind, error = %e, "Reflector watch error");
                }
            })
            .await;
        warn!(kind, "Reflector stream ended");
    });
    reader
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> ServerConfig {
        ServerConfig {
            metrics_port: 0,
            startup_timeout_secs: 1,
            poll_interval_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_wait_returns_once_ready() {
        let state = Arc::new(ServerState::default());
        let task_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            task_state.mark_ready();
            std::future::pending::<()>().await;
        });

        wait_for_server_ready(&state, &handle, &fast_config())
            .await
            .expect("server becomes ready");
        handle.abort();
    }

    #[tokio::test]
    async fn test_wait_fails_when_server_task_exits() {
        let state = Arc::new(ServerState::default());
        let handle = tokio::spawn(async {});
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = wait_for_server_ready(&state, &handle, &fast_config())
            .await
            .expect_err("crashed server is reported");
        assert!(err.to_string().contains("failed to start"));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let state = Arc::new(ServerState::default());
        let handle = tokio::spawn(std::future::pending::<()>());

        let err = wait_for_server_ready(&state, &handle, &fast_config())
            .await
            .expect_err("never-ready server times out");
        assert!(err.to_string().contains("within 1 seconds"));
        handle.abort();
    }
}
