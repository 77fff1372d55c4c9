//! Reconciliation logic for the status controller.
//!
//! - `status`: aggregates DaemonSets and node results into the FileIntegrity phase
//! - `report`: turns report ConfigMaps uploaded by the daemons into NodeStatus objects
//! - `node`: holds scans off on nodes that are being updated

pub mod node;
pub mod report;
pub mod status;

#[cfg(test)]
mod node_test;
#[cfg(test)]
mod report_test;

use crate::client::ClusterClient;
use crate::metrics::Metrics;
use std::sync::Arc;

/// Reconciles FileIntegrity objects, their reports and the nodes they run on.
pub struct Reconciler {
    pub(crate) client: Arc<dyn ClusterClient>,
    pub(crate) metrics: Arc<Metrics>,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ClusterClient>, metrics: Arc<Metrics>) -> Self {
        Self { client, metrics }
    }
}
