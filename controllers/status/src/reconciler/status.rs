//! FileIntegrity phase reconciliation.
//!
//! `Pending -> Initializing -> Active <-> Error`. A running re-init
//! DaemonSet always means Initializing; otherwise the scan DaemonSet
//! decides, and once it is fully rolled out the node results do.

use super::Reconciler;
use crate::error::ControllerError;
use crds::{daemon_set_name, FileIntegrity, FileIntegrityPhase, NodeCondition};
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Requeue period after a successful reconcile
pub const STATUS_REQUEUE: Duration = Duration::from_secs(30);

/// Reason attached to phase change events
pub const STATUS_EVENT_REASON: &str = "FileIntegrityStatus";

/// Every desired pod is scheduled and available
pub fn daemon_set_is_ready(ds: &DaemonSet) -> bool {
    let Some(status) = &ds.status else {
        return false;
    };
    let desired = status.desired_number_scheduled;
    desired > 0 && desired == status.number_available.unwrap_or(0)
}

/// A rollout is in progress
pub fn daemon_set_is_updating(ds: &DaemonSet) -> bool {
    let Some(status) = &ds.status else {
        return false;
    };
    let updated = status.updated_number_scheduled.unwrap_or(0);
    let unavailable = status.number_unavailable.unwrap_or(0);
    updated > 0 && (updated < status.desired_number_scheduled || unavailable > 0)
}

impl Reconciler {
    pub async fn reconcile_file_integrity(
        &self,
        fi: &FileIntegrity,
    ) -> Result<Action, ControllerError> {
        let name = fi.name_any();
        if fi.metadata.deletion_timestamp.is_some() {
            debug!("FileIntegrity {} is being deleted", name);
            return Ok(Action::await_change());
        }

        let phase = self.desired_phase(&name).await?;
        let current = fi.phase();
        if phase == current && fi.status.is_some() {
            return Ok(Action::requeue(STATUS_REQUEUE));
        }

        info!("FileIntegrity {} phase {} -> {}", name, current, phase);
        self.client.patch_phase(&name, phase).await?;
        if let Err(e) = self
            .client
            .publish_event(fi, phase == FileIntegrityPhase::Error, STATUS_EVENT_REASON, phase.as_str())
            .await
        {
            warn!("failed to publish phase event for {}: {}", name, e);
        }
        self.metrics.inc_phase(phase);

        Ok(Action::requeue(STATUS_REQUEUE))
    }

    async fn desired_phase(&self, name: &str) -> Result<FileIntegrityPhase, ControllerError> {
        if !self.client.list_reinit_daemon_sets(name).await?.is_empty() {
            debug!("re-init DaemonSet present for {}", name);
            return Ok(FileIntegrityPhase::Initializing);
        }

        let Some(ds) = self.client.get_daemon_set(&daemon_set_name(name)).await? else {
            return Ok(FileIntegrityPhase::Pending);
        };

        if daemon_set_is_ready(&ds) && !daemon_set_is_updating(&ds) {
            self.aggregate_node_statuses(name).await
        } else {
            Ok(FileIntegrityPhase::Initializing)
        }
    }

    /// Error if any node reports Errored, Active otherwise.
    ///
    /// Statuses of nodes that no longer exist are deleted and ignored.
    async fn aggregate_node_statuses(
        &self,
        name: &str,
    ) -> Result<FileIntegrityPhase, ControllerError> {
        let mut errored = false;
        for status in self.client.list_node_statuses(name).await? {
            let node = &status.spec.node_name;
            if !self.client.node_exists(node).await? {
                info!("deleting {} for removed node {}", status.name_any(), node);
                self.client.delete_node_status(&status.name_any()).await?;
                continue;
            }
            if status.spec.condition() == Some(NodeCondition::Errored) {
                debug!("node {} reports an error for {}", node, name);
                errored = true;
            }
        }

        Ok(if errored {
            FileIntegrityPhase::Error
        } else {
            FileIntegrityPhase::Active
        })
    }
}
