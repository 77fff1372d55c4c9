//! Kubernetes resource watchers.
//!
//! Every watched kind goes through [`watch_resource`], which drives a
//! `kube_runtime::Controller` with shared debounce, concurrency and retry
//! settings.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{FileIntegrity, FileIntegrityNodeStatus, RESULT_LOG_LABEL};
use futures::future::{BoxFuture, FutureExt};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Node};
use kube::Api;
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Requeue delay after a failed reconcile
pub const ERROR_REQUEUE: Duration = Duration::from_secs(60);

type ReconcileFn<K> =
    fn(Arc<Reconciler>, Arc<K>) -> BoxFuture<'static, Result<Action, ControllerError>>;

/// Run `controller` until its stream ends, reconciling with `reconcile_fn`
async fn watch_resource<K>(
    controller: Controller<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: ReconcileFn<K>,
    resource_name: &'static str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
{
    info!("Starting {} watcher", resource_name);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, _ctx: Arc<Reconciler>| {
        error!(
            "Reconciliation error for {} {}: {}",
            resource_name,
            obj.meta().name.as_deref().unwrap_or_default(),
            error
        );
        Action::requeue(ERROR_REQUEUE)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        debug!(
            "Reconciling {} {}",
            resource_name,
            obj.meta().name.as_deref().unwrap_or_default()
        );
        reconcile_fn(ctx, obj)
    };

    let config = RuntimeConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(3);

    controller
        .with_config(config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                debug!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    Err(ControllerError::Watch(format!("{resource_name} watcher stopped")))
}

/// Watches FileIntegrity objects, their reports and the cluster's nodes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    file_integrity_api: Api<FileIntegrity>,
    daemon_set_api: Api<DaemonSet>,
    node_status_api: Api<FileIntegrityNodeStatus>,
    config_map_api: Api<ConfigMap>,
    node_api: Api<Node>,
}

impl Watcher {
    pub fn new(
        reconciler: Arc<Reconciler>,
        file_integrity_api: Api<FileIntegrity>,
        daemon_set_api: Api<DaemonSet>,
        node_status_api: Api<FileIntegrityNodeStatus>,
        config_map_api: Api<ConfigMap>,
        node_api: Api<Node>,
    ) -> Self {
        Self {
            reconciler,
            file_integrity_api,
            daemon_set_api,
            node_status_api,
            config_map_api,
            node_api,
        }
    }

    /// FileIntegrity phases; DaemonSet and NodeStatus changes requeue the owner
    pub async fn watch_file_integrities(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.file_integrity_api.clone(), watcher::Config::default())
            .owns(self.daemon_set_api.clone(), watcher::Config::default())
            .owns(self.node_status_api.clone(), watcher::Config::default());
        watch_resource(
            controller,
            self.reconciler.clone(),
            |reconciler, fi| async move { reconciler.reconcile_file_integrity(&fi).await }.boxed(),
            "FileIntegrity",
        )
        .await
    }

    /// Report ConfigMaps uploaded by the node daemons
    pub async fn watch_reports(&self) -> Result<(), ControllerError> {
        let config = watcher::Config::default().labels(RESULT_LOG_LABEL);
        let controller = Controller::new(self.config_map_api.clone(), config);
        watch_resource(
            controller,
            self.reconciler.clone(),
            |reconciler, cm| async move { reconciler.reconcile_report(&cm).await }.boxed(),
            "report ConfigMap",
        )
        .await
    }

    /// Machine-config state of every node
    pub async fn watch_nodes(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.node_api.clone(), watcher::Config::default());
        watch_resource(
            controller,
            self.reconciler.clone(),
            |reconciler, node| async move { reconciler.reconcile_node(&node).await }.boxed(),
            "Node",
        )
        .await
    }
}
