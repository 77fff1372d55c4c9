//! Report aggregation.
//!
//! Each node daemon uploads its latest result as a temporary ConfigMap.
//! The result is folded into the node's `FileIntegrityNodeStatus` and the
//! report is deleted, which lets the daemon upload the next one.

use super::Reconciler;
use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use crds::{
    failed_log_name, node_status_name, FileIntegrity, FileIntegrityNodeStatus,
    FileIntegrityNodeStatusSpec, NodeCondition, ScanResult, COMPRESSED_ANNOTATION,
    ERROR_MSG_ANNOTATION, FILES_ADDED_ANNOTATION, FILES_CHANGED_ANNOTATION,
    FILES_REMOVED_ANNOTATION, LOG_CONTENT_KEY, NODE_LABEL, OWNER_LABEL, RESULT_LOG_LABEL,
};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

fn annotation<'a>(cm: &'a ConfigMap, key: &str) -> Option<&'a str> {
    cm.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

fn count(cm: &ConfigMap, key: &str) -> u32 {
    annotation(cm, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn log_contents(cm: &ConfigMap) -> Option<&str> {
    cm.data
        .as_ref()
        .and_then(|d| d.get(LOG_CONTENT_KEY))
        .map(String::as_str)
        .filter(|log| !log.is_empty())
}

/// Classify a report.
///
/// An error annotation wins over any payload; a non-empty log means the
/// scan found differences.
pub fn scan_result_from_report(cm: &ConfigMap, now: DateTime<Utc>) -> ScanResult {
    let mut result = ScanResult {
        last_probe_time: now,
        condition: NodeCondition::Succeeded,
        result_config_map_name: None,
        result_config_map_namespace: None,
        error_message: None,
        files_added: 0,
        files_changed: 0,
        files_removed: 0,
    };

    if let Some(message) = annotation(cm, ERROR_MSG_ANNOTATION) {
        result.condition = NodeCondition::Errored;
        result.error_message = Some(message.to_string());
    } else if log_contents(cm).is_some() {
        result.condition = NodeCondition::Failed;
        result.files_added = count(cm, FILES_ADDED_ANNOTATION);
        result.files_changed = count(cm, FILES_CHANGED_ANNOTATION);
        result.files_removed = count(cm, FILES_REMOVED_ANNOTATION);
    }
    result
}

fn owner_reference(fi: &FileIntegrity) -> Result<OwnerReference, ControllerError> {
    fi.controller_owner_ref(&()).ok_or_else(|| {
        ControllerError::InvalidObject(format!("FileIntegrity {} has no uid", fi.name_any()))
    })
}

fn owned_labels(owner: &str, node: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (OWNER_LABEL.to_string(), owner.to_string()),
        (NODE_LABEL.to_string(), node.to_string()),
    ])
}

/// Durable copy of a failed scan log, owned by the FileIntegrity
pub fn failed_log_config_map(
    fi: &FileIntegrity,
    node: &str,
    report: &ConfigMap,
) -> Result<ConfigMap, ControllerError> {
    let owner = fi.name_any();
    let annotations = annotation(report, COMPRESSED_ANNOTATION).map(|_| {
        BTreeMap::from([(COMPRESSED_ANNOTATION.to_string(), String::new())])
    });

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(failed_log_name(&owner, node)),
            namespace: fi.namespace(),
            labels: Some(owned_labels(&owner, node)),
            annotations,
            owner_references: Some(vec![owner_reference(fi)?]),
            ..Default::default()
        },
        data: report.data.clone(),
        ..Default::default()
    })
}

/// NodeStatus object to apply for `spec`
pub fn node_status_object(
    fi: &FileIntegrity,
    spec: FileIntegrityNodeStatusSpec,
) -> Result<FileIntegrityNodeStatus, ControllerError> {
    let owner = fi.name_any();
    let mut status = FileIntegrityNodeStatus::new(&node_status_name(&owner, &spec.node_name), spec);
    status.metadata.namespace = fi.namespace();
    status.metadata.labels = Some(owned_labels(&owner, &status.spec.node_name));
    status.metadata.owner_references = Some(vec![owner_reference(fi)?]);
    Ok(status)
}

impl Reconciler {
    pub async fn reconcile_report(&self, cm: &ConfigMap) -> Result<Action, ControllerError> {
        let name = cm.name_any();
        let labels = cm.labels();
        if !labels.contains_key(RESULT_LOG_LABEL) {
            return Ok(Action::await_change());
        }
        let (Some(owner), Some(node)) = (labels.get(OWNER_LABEL), labels.get(NODE_LABEL)) else {
            warn!("report {} is missing its owner or node label, skipping", name);
            return Ok(Action::await_change());
        };

        let Some(fi) = self.client.get_file_integrity(owner).await? else {
            info!("FileIntegrity {} is gone, deleting report {}", owner, name);
            self.client.delete_config_map(&name).await?;
            return Ok(Action::await_change());
        };

        let mut result = scan_result_from_report(cm, Utc::now());
        let condition = result.condition;
        debug!("report {} from node {}: {}", name, node, condition.as_str());

        if condition == NodeCondition::Failed {
            let failed = failed_log_config_map(&fi, node, cm)?;
            result.result_config_map_name = failed.metadata.name.clone();
            result.result_config_map_namespace = failed.metadata.namespace.clone();
            self.client.apply_config_map(&failed).await?;
        }

        let mut spec = match self.client.get_node_status(&node_status_name(owner, node)).await? {
            Some(existing) => existing.spec,
            None => FileIntegrityNodeStatusSpec {
                node_name: node.clone(),
                ..Default::default()
            },
        };
        spec.record(result);
        self.client
            .apply_node_status(&node_status_object(&fi, spec)?)
            .await?;
        self.metrics.observe_node_status(condition, node);

        info!("recorded {} result for {} on {}", condition.as_str(), owner, node);
        self.client.delete_config_map(&name).await?;
        Ok(Action::await_change())
    }
}
