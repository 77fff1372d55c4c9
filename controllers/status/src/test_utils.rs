//! Test utilities for unit testing reconcilers
//!
//! An in-memory [`ClusterClient`] plus builders for the objects the
//! reconcilers read.

use crate::client::ClusterClient;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use async_trait::async_trait;
use crds::*;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Node};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub const NAMESPACE: &str = "file-integrity";

/// Event captured by [`MockClusterClient::publish_event`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub note: String,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub file_integrities: BTreeMap<String, FileIntegrity>,
    pub daemon_sets: BTreeMap<String, DaemonSet>,
    pub node_statuses: BTreeMap<String, FileIntegrityNodeStatus>,
    pub config_maps: BTreeMap<String, ConfigMap>,
    pub nodes: BTreeSet<String>,
    pub events: Vec<RecordedEvent>,
    pub phase_patches: Vec<(String, FileIntegrityPhase)>,
    pub deleted_config_maps: Vec<String>,
}

/// Mock cluster sharing its state between clones
#[derive(Debug, Clone, Default)]
pub struct MockClusterClient {
    state: Arc<Mutex<MockState>>,
}

impl MockClusterClient {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn add_file_integrity(&self, fi: FileIntegrity) {
        self.state().file_integrities.insert(fi.name_any(), fi);
    }

    pub fn add_daemon_set(&self, ds: DaemonSet) {
        self.state().daemon_sets.insert(ds.name_any(), ds);
    }

    pub fn add_node_status(&self, status: FileIntegrityNodeStatus) {
        self.state().node_statuses.insert(status.name_any(), status);
    }

    pub fn add_node(&self, name: &str) {
        self.state().nodes.insert(name.to_string());
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.state().events.clone()
    }

    pub fn file_integrity(&self, name: &str) -> FileIntegrity {
        self.state().file_integrities[name].clone()
    }
}

fn has_label(meta: &ObjectMeta, key: &str, value: Option<&str>) -> bool {
    match meta.labels.as_ref().and_then(|l| l.get(key)) {
        Some(v) => value.is_none_or(|expected| v == expected),
        None => false,
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn get_file_integrity(&self, name: &str) -> Result<Option<FileIntegrity>, ControllerError> {
        Ok(self.state().file_integrities.get(name).cloned())
    }

    async fn list_file_integrities(&self) -> Result<Vec<FileIntegrity>, ControllerError> {
        Ok(self.state().file_integrities.values().cloned().collect())
    }

    async fn patch_phase(&self, name: &str, phase: FileIntegrityPhase) -> Result<(), ControllerError> {
        let mut state = self.state();
        state.phase_patches.push((name.to_string(), phase));
        if let Some(fi) = state.file_integrities.get_mut(name) {
            fi.status = Some(FileIntegrityStatus { phase });
        }
        Ok(())
    }

    async fn patch_annotations(
        &self,
        name: &str,
        annotations: BTreeMap<String, Option<String>>,
    ) -> Result<(), ControllerError> {
        let mut state = self.state();
        let fi = state
            .file_integrities
            .get_mut(name)
            .ok_or_else(|| ControllerError::InvalidObject(format!("no FileIntegrity {name}")))?;
        let current = fi.metadata.annotations.get_or_insert_with(BTreeMap::new);
        for (key, value) in annotations {
            match value {
                Some(v) => {
                    current.insert(key, v);
                }
                None => {
                    current.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn get_daemon_set(&self, name: &str) -> Result<Option<DaemonSet>, ControllerError> {
        Ok(self.state().daemon_sets.get(name).cloned())
    }

    async fn list_reinit_daemon_sets(&self, owner: &str) -> Result<Vec<DaemonSet>, ControllerError> {
        Ok(self
            .state()
            .daemon_sets
            .values()
            .filter(|ds| {
                has_label(&ds.metadata, OWNER_LABEL, Some(owner))
                    && has_label(&ds.metadata, REINIT_LABEL, None)
            })
            .cloned()
            .collect())
    }

    async fn list_node_statuses(
        &self,
        owner: &str,
    ) -> Result<Vec<FileIntegrityNodeStatus>, ControllerError> {
        Ok(self
            .state()
            .node_statuses
            .values()
            .filter(|s| has_label(&s.metadata, OWNER_LABEL, Some(owner)))
            .cloned()
            .collect())
    }

    async fn get_node_status(
        &self,
        name: &str,
    ) -> Result<Option<FileIntegrityNodeStatus>, ControllerError> {
        Ok(self.state().node_statuses.get(name).cloned())
    }

    async fn apply_node_status(&self, status: &FileIntegrityNodeStatus) -> Result<(), ControllerError> {
        self.add_node_status(status.clone());
        Ok(())
    }

    async fn delete_node_status(&self, name: &str) -> Result<(), ControllerError> {
        self.state().node_statuses.remove(name);
        Ok(())
    }

    async fn node_exists(&self, name: &str) -> Result<bool, ControllerError> {
        Ok(self.state().nodes.contains(name))
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<(), ControllerError> {
        self.state()
            .config_maps
            .insert(config_map.name_any(), config_map.clone());
        Ok(())
    }

    async fn delete_config_map(&self, name: &str) -> Result<(), ControllerError> {
        let mut state = self.state();
        state.config_maps.remove(name);
        state.deleted_config_maps.push(name.to_string());
        Ok(())
    }

    async fn publish_event(
        &self,
        fi: &FileIntegrity,
        warning: bool,
        reason: &str,
        note: &str,
    ) -> Result<(), ControllerError> {
        self.state().events.push(RecordedEvent {
            object: fi.name_any(),
            warning,
            reason: reason.to_string(),
            note: note.to_string(),
        });
        Ok(())
    }
}

/// Reconciler wired to a fresh mock and its own metrics registry
pub fn create_test_reconciler() -> (Reconciler, MockClusterClient) {
    let client = MockClusterClient::default();
    let metrics = Metrics::new().unwrap();
    let reconciler = Reconciler::new(Arc::new(client.clone()), Arc::new(metrics));
    (reconciler, client)
}

/// FileIntegrity with a uid so owner references can be built
pub fn create_test_file_integrity(name: &str, phase: Option<FileIntegrityPhase>) -> FileIntegrity {
    let mut fi = FileIntegrity::new(name, FileIntegritySpec::default());
    fi.metadata.namespace = Some(NAMESPACE.to_string());
    fi.metadata.uid = Some(format!("uid-{name}"));
    fi.status = phase.map(|phase| FileIntegrityStatus { phase });
    fi
}

/// DaemonSet with the given scheduling counters
pub fn create_test_daemon_set(
    name: &str,
    desired: i32,
    available: i32,
    updated: i32,
    unavailable: i32,
) -> DaemonSet {
    DaemonSet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: None,
        status: Some(DaemonSetStatus {
            desired_number_scheduled: desired,
            number_available: Some(available),
            updated_number_scheduled: Some(updated),
            number_unavailable: Some(unavailable),
            ..Default::default()
        }),
    }
}

/// NodeStatus for `owner` on `node` whose last result has `condition`
pub fn create_test_node_status(
    owner: &str,
    node: &str,
    condition: NodeCondition,
) -> FileIntegrityNodeStatus {
    let mut spec = FileIntegrityNodeStatusSpec {
        node_name: node.to_string(),
        ..Default::default()
    };
    spec.record(ScanResult {
        last_probe_time: chrono::Utc::now(),
        condition,
        result_config_map_name: None,
        result_config_map_namespace: None,
        error_message: None,
        files_added: 0,
        files_changed: 0,
        files_removed: 0,
    });
    let mut status = FileIntegrityNodeStatus::new(&node_status_name(owner, node), spec);
    status.metadata.namespace = Some(NAMESPACE.to_string());
    status.metadata.labels = Some(BTreeMap::from([(OWNER_LABEL.to_string(), owner.to_string())]));
    status
}

/// Report ConfigMap as uploaded by the node daemon
pub fn create_test_report(
    owner: &str,
    node: &str,
    annotations: &[(&str, &str)],
    log: Option<&str>,
) -> ConfigMap {
    let labels = BTreeMap::from([
        (OWNER_LABEL.to_string(), owner.to_string()),
        (RESULT_LOG_LABEL.to_string(), String::new()),
        (NODE_LABEL.to_string(), node.to_string()),
    ]);
    let annotations: BTreeMap<String, String> = annotations
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(report_name(&report_prefix(owner), node)),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(labels),
            annotations: (!annotations.is_empty()).then_some(annotations),
            ..Default::default()
        },
        data: log.map(|l| BTreeMap::from([(LOG_CONTENT_KEY.to_string(), l.to_string())])),
        ..Default::default()
    }
}

/// Node carrying machine-config annotations
pub fn create_test_node(
    name: &str,
    labels: &[(&str, &str)],
    current: &str,
    desired: &str,
    state: &str,
) -> Node {
    let annotations = BTreeMap::from([
        (crate::reconciler::node::CURRENT_CONFIG_ANNOTATION.to_string(), current.to_string()),
        (crate::reconciler::node::DESIRED_CONFIG_ANNOTATION.to_string(), desired.to_string()),
        (crate::reconciler::node::STATE_ANNOTATION.to_string(), state.to_string()),
    ]);
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            annotations: Some(annotations),
            ..Default::default()
        },
        ..Default::default()
    }
}
