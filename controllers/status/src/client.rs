//! Cluster access used by the reconcilers.
//!
//! Everything goes through [`ClusterClient`] so reconcilers can be unit
//! tested against the in-memory mock in `test_utils`.

use crate::error::ControllerError;
use async_trait::async_trait;
use crds::{FileIntegrity, FileIntegrityNodeStatus, FileIntegrityPhase, OWNER_LABEL, REINIT_LABEL};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Node};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Field manager and event reporter name
pub const MANAGER: &str = "status-controller";

#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_file_integrity(&self, name: &str) -> Result<Option<FileIntegrity>, ControllerError>;

    async fn list_file_integrities(&self) -> Result<Vec<FileIntegrity>, ControllerError>;

    /// Write `status.phase`
    async fn patch_phase(&self, name: &str, phase: FileIntegrityPhase) -> Result<(), ControllerError>;

    /// Merge annotations; a `None` value deletes the key
    async fn patch_annotations(
        &self,
        name: &str,
        annotations: BTreeMap<String, Option<String>>,
    ) -> Result<(), ControllerError>;

    async fn get_daemon_set(&self, name: &str) -> Result<Option<DaemonSet>, ControllerError>;

    /// Re-init DaemonSets created for the given FileIntegrity
    async fn list_reinit_daemon_sets(&self, owner: &str) -> Result<Vec<DaemonSet>, ControllerError>;

    async fn list_node_statuses(
        &self,
        owner: &str,
    ) -> Result<Vec<FileIntegrityNodeStatus>, ControllerError>;

    async fn get_node_status(
        &self,
        name: &str,
    ) -> Result<Option<FileIntegrityNodeStatus>, ControllerError>;

    async fn apply_node_status(&self, status: &FileIntegrityNodeStatus) -> Result<(), ControllerError>;

    async fn delete_node_status(&self, name: &str) -> Result<(), ControllerError>;

    async fn node_exists(&self, name: &str) -> Result<bool, ControllerError>;

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<(), ControllerError>;

    async fn delete_config_map(&self, name: &str) -> Result<(), ControllerError>;

    async fn publish_event(
        &self,
        fi: &FileIntegrity,
        warning: bool,
        reason: &str,
        note: &str,
    ) -> Result<(), ControllerError>;
}

/// [`ClusterClient`] backed by the Kubernetes API, scoped to one namespace
pub struct KubeClusterClient {
    file_integrities: Api<FileIntegrity>,
    node_statuses: Api<FileIntegrityNodeStatus>,
    daemon_sets: Api<DaemonSet>,
    config_maps: Api<ConfigMap>,
    nodes: Api<Node>,
    recorder: Recorder,
}

impl KubeClusterClient {
    pub fn new(client: Client, namespace: &str) -> Self {
        let reporter = Reporter::from(MANAGER);
        Self {
            file_integrities: Api::namespaced(client.clone(), namespace),
            node_statuses: Api::namespaced(client.clone(), namespace),
            daemon_sets: Api::namespaced(client.clone(), namespace),
            config_maps: Api::namespaced(client.clone(), namespace),
            nodes: Api::all(client.clone()),
            recorder: Recorder::new(client, reporter),
        }
    }
}

/// Treat a 404 on delete as success
fn ignore_not_found(result: Result<(), kube::Error>) -> Result<(), ControllerError> {
    match result {
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        other => Ok(other?),
    }
}

fn apply_params() -> PatchParams {
    PatchParams::apply(MANAGER).force()
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_file_integrity(&self, name: &str) -> Result<Option<FileIntegrity>, ControllerError> {
        Ok(self.file_integrities.get_opt(name).await?)
    }

    async fn list_file_integrities(&self) -> Result<Vec<FileIntegrity>, ControllerError> {
        Ok(self.file_integrities.list(&ListParams::default()).await?.items)
    }

    async fn patch_phase(&self, name: &str, phase: FileIntegrityPhase) -> Result<(), ControllerError> {
        let patch = json!({ "status": { "phase": phase } });
        self.file_integrities
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_annotations(
        &self,
        name: &str,
        annotations: BTreeMap<String, Option<String>>,
    ) -> Result<(), ControllerError> {
        let patch = json!({ "metadata": { "annotations": annotations } });
        self.file_integrities
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_daemon_set(&self, name: &str) -> Result<Option<DaemonSet>, ControllerError> {
        Ok(self.daemon_sets.get_opt(name).await?)
    }

    async fn list_reinit_daemon_sets(&self, owner: &str) -> Result<Vec<DaemonSet>, ControllerError> {
        let params = ListParams::default().labels(&format!("{OWNER_LABEL}={owner},{REINIT_LABEL}"));
        Ok(self.daemon_sets.list(&params).await?.items)
    }

    async fn list_node_statuses(
        &self,
        owner: &str,
    ) -> Result<Vec<FileIntegrityNodeStatus>, ControllerError> {
        let params = ListParams::default().labels(&format!("{OWNER_LABEL}={owner}"));
        Ok(self.node_statuses.list(&params).await?.items)
    }

    async fn get_node_status(
        &self,
        name: &str,
    ) -> Result<Option<FileIntegrityNodeStatus>, ControllerError> {
        Ok(self.node_statuses.get_opt(name).await?)
    }

    async fn apply_node_status(&self, status: &FileIntegrityNodeStatus) -> Result<(), ControllerError> {
        let name = status.name_any();
        debug!("applying FileIntegrityNodeStatus {}", name);
        self.node_statuses
            .patch(&name, &apply_params(), &Patch::Apply(status))
            .await?;
        Ok(())
    }

    async fn delete_node_status(&self, name: &str) -> Result<(), ControllerError> {
        let result = self.node_statuses.delete(name, &DeleteParams::default()).await;
        ignore_not_found(result.map(|_| ()))
    }

    async fn node_exists(&self, name: &str) -> Result<bool, ControllerError> {
        Ok(self.nodes.get_opt(name).await?.is_some())
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<(), ControllerError> {
        let name = config_map.name_any();
        debug!("applying ConfigMap {}", name);
        self.config_maps
            .patch(&name, &apply_params(), &Patch::Apply(config_map))
            .await?;
        Ok(())
    }

    async fn delete_config_map(&self, name: &str) -> Result<(), ControllerError> {
        let result = self.config_maps.delete(name, &DeleteParams::default()).await;
        ignore_not_found(result.map(|_| ()))
    }

    async fn publish_event(
        &self,
        fi: &FileIntegrity,
        warning: bool,
        reason: &str,
        note: &str,
    ) -> Result<(), ControllerError> {
        let event = Event {
            type_: if warning { EventType::Warning } else { EventType::Normal },
            reason: reason.to_string(),
            note: Some(note.to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        self.recorder.publish(&event, &fi.object_ref(&())).await?;
        Ok(())
    }
}
