//! Node hold-off coordination.
//!
//! While the machine-config daemon updates a node its files change under
//! AIDE's feet, so scans on that node are held off. Once the node settles
//! the hold-off is lifted and the node's database is re-initialized.

use super::Reconciler;
use crate::error::ControllerError;
use crate::metrics::REINIT_BY_NODE;
use crds::{add_node, remove_node, AnnotationChange, FileIntegrity, HOLDOFF_ANNOTATION, REINIT_ANNOTATION};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const CURRENT_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/currentConfig";
pub const DESIRED_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/desiredConfig";
pub const STATE_ANNOTATION: &str = "machineconfiguration.openshift.io/state";

const STATE_WORKING: &str = "Working";
const STATE_DONE: &str = "Done";
const STATE_DEGRADED: &str = "Degraded";

/// Where a node is in a machine-config rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeUpdate {
    /// A new configuration is being applied
    Updating,
    /// The rollout finished or gave up
    Settled,
    /// Anything else, including a pending update that has not started
    Other,
}

/// Read the rollout state; `None` when the node is not machine-config managed
pub fn node_update_state(node: &Node) -> Option<NodeUpdate> {
    let annotations = node.annotations();
    let current = annotations.get(CURRENT_CONFIG_ANNOTATION)?;
    let desired = annotations.get(DESIRED_CONFIG_ANNOTATION)?;
    let state = annotations.get(STATE_ANNOTATION)?;

    Some(if current != desired && state == STATE_WORKING {
        NodeUpdate::Updating
    } else if (current == desired && state == STATE_DONE) || state == STATE_DEGRADED {
        NodeUpdate::Settled
    } else {
        NodeUpdate::Other
    })
}

/// Every selector entry is present on the node; an empty selector matches all
pub fn selector_matches(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

impl Reconciler {
    pub async fn reconcile_node(&self, node: &Node) -> Result<Action, ControllerError> {
        let Some(update) = node_update_state(node) else {
            return Ok(Action::await_change());
        };
        if update == NodeUpdate::Other {
            return Ok(Action::await_change());
        }

        let name = node.name_any();
        for fi in self.client.list_file_integrities().await? {
            if !selector_matches(&fi.spec.node_selector, node.labels()) {
                continue;
            }
            match update {
                NodeUpdate::Updating => self.hold_off_node(&fi, &name).await?,
                NodeUpdate::Settled => self.release_node(&fi, &name).await?,
                NodeUpdate::Other => {}
            }
        }
        Ok(Action::await_change())
    }

    async fn hold_off_node(&self, fi: &FileIntegrity, node: &str) -> Result<(), ControllerError> {
        let AnnotationChange::Set(value) = add_node(fi.annotation(HOLDOFF_ANNOTATION), node) else {
            return Ok(());
        };
        info!("node {} is updating, holding off {}", node, fi.name_any());
        let patch = BTreeMap::from([(HOLDOFF_ANNOTATION.to_string(), Some(value))]);
        self.client.patch_annotations(&fi.name_any(), patch).await?;
        self.metrics.inc_pause(node);
        Ok(())
    }

    /// Lift the hold-off and ask for a re-init in one patch
    async fn release_node(&self, fi: &FileIntegrity, node: &str) -> Result<(), ControllerError> {
        let hold_off = match remove_node(fi.annotation(HOLDOFF_ANNOTATION), node) {
            AnnotationChange::Unchanged => {
                debug!("{} is not held off on {}", fi.name_any(), node);
                return Ok(());
            }
            AnnotationChange::Set(value) => Some(value),
            AnnotationChange::Remove => None,
        };

        let mut patch = BTreeMap::from([(HOLDOFF_ANNOTATION.to_string(), hold_off)]);
        let reinit = add_node(fi.annotation(REINIT_ANNOTATION), node);
        if let AnnotationChange::Set(value) = &reinit {
            patch.insert(REINIT_ANNOTATION.to_string(), Some(value.clone()));
        }

        info!("node {} finished updating, releasing {}", node, fi.name_any());
        self.client.patch_annotations(&fi.name_any(), patch).await?;
        self.metrics.inc_unpause(node);
        if reinit != AnnotationChange::Unchanged {
            self.metrics.inc_reinit(REINIT_BY_NODE, node);
        }
        Ok(())
    }
}
