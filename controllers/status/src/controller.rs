//! Main controller implementation.
//!
//! Starts the FileIntegrity, report and node watchers plus the metrics
//! endpoint, and exits when any of them stops or a shutdown is requested.

use crate::client::KubeClusterClient;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::{self, Metrics};
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::{FileIntegrity, FileIntegrityNodeStatus};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Node};
use kube::{Api, Client};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for FileIntegrity status.
pub struct Controller {
    file_integrity_watcher: JoinHandle<Result<(), ControllerError>>,
    report_watcher: JoinHandle<Result<(), ControllerError>>,
    node_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
}

fn flatten(
    what: &str,
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    result.map_err(|e| ControllerError::Watch(format!("{what} panicked: {e}")))?
}

impl Controller {
    /// Creates the reconciler and starts every watcher.
    pub fn new(config: &ControllerConfig, client: Client) -> Result<Self, ControllerError> {
        info!("Initializing status controller in namespace {}", config.namespace);

        let metrics = Arc::new(Metrics::new()?);
        let cluster = KubeClusterClient::new(client.clone(), &config.namespace);
        let reconciler = Arc::new(Reconciler::new(Arc::new(cluster), Arc::clone(&metrics)));

        let ns = config.namespace.as_str();
        let watcher_instance = Arc::new(Watcher::new(
            reconciler,
            Api::<FileIntegrity>::namespaced(client.clone(), ns),
            Api::<DaemonSet>::namespaced(client.clone(), ns),
            Api::<FileIntegrityNodeStatus>::namespaced(client.clone(), ns),
            Api::<ConfigMap>::namespaced(client.clone(), ns),
            Api::<Node>::all(client),
        ));

        let file_integrity_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_file_integrities().await })
        };

        let report_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_reports().await })
        };

        let node_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_nodes().await })
        };

        let metrics_server = tokio::spawn(metrics::serve(config.metrics_addr, metrics));

        Ok(Self {
            file_integrity_watcher,
            report_watcher,
            node_watcher,
            metrics_server,
        })
    }

    /// Runs until a watcher exits or `signal` resolves.
    pub async fn run<S>(mut self, signal: S) -> Result<(), ControllerError>
    where
        S: Future<Output = ()>,
    {
        info!("Status controller running");

        let result = tokio::select! {
            result = &mut self.file_integrity_watcher => flatten("FileIntegrity watcher", result),
            result = &mut self.report_watcher => flatten("report watcher", result),
            result = &mut self.node_watcher => flatten("Node watcher", result),
            result = &mut self.metrics_server => flatten("metrics server", result),
            () = signal => {
                info!("shutdown signal received");
                Ok(())
            }
        };

        self.file_integrity_watcher.abort();
        self.report_watcher.abort();
        self.node_watcher.abort();
        self.metrics_server.abort();
        result
    }
}
